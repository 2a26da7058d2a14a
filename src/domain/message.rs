//! Outbound messages.

use crate::domain::lookup::LookupKey;

/// Where an outbound message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Target {
    /// Public post with no reply target.
    Broadcast,
    /// Public post replying to the given item.
    Reply(LookupKey),
    /// Private message to the given user.
    ///
    /// Direct messages are not subject to the posting limit: they are neither
    /// gated by nor able to trigger the posting cooldown.
    Direct(i64),
}

/// A message waiting to be sent.
///
/// Consumed exactly once by the dispatcher and dropped afterwards, whatever
/// the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutboundMessage {
    /// Text to send
    pub body: String,
    /// Destination
    pub target: Target,
}

impl OutboundMessage {
    /// Public post without a reply target.
    pub fn broadcast(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            target: Target::Broadcast,
        }
    }

    /// Public post replying to `to`.
    pub fn reply(to: LookupKey, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            target: Target::Reply(to),
        }
    }

    /// Private message to `user_id`.
    pub fn direct(user_id: i64, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            target: Target::Direct(user_id),
        }
    }

    /// Reply target, if this is a reply.
    pub fn reply_to(&self) -> Option<LookupKey> {
        match self.target {
            Target::Reply(key) => Some(key),
            _ => None,
        }
    }

    /// Whether this message counts against the posting rate limit.
    pub fn is_rate_gated(&self) -> bool {
        !matches!(self.target, Target::Direct(_))
    }
}
