//! Who a command came from, and how to answer them.
//!
//! The command layer hands the core a [`Sender`] instead of switching on the
//! concrete event type. The set of senders is closed; every variant exposes
//! the same two capabilities: a display name and a way to build the answer
//! message.

use crate::domain::lookup::LookupKey;
use crate::domain::message::OutboundMessage;

/// Origin of an inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Sender {
    /// A public post mentioning us.
    Timeline {
        /// The post to reply to
        status_id: LookupKey,
        /// Author handle, without the leading `@`
        screen_name: String,
        /// Author display name
        name: String,
    },
    /// A direct message.
    Direct {
        /// Author user id
        user_id: i64,
        /// Author handle, without the leading `@`
        screen_name: String,
        /// Author display name
        name: String,
    },
}

impl Sender {
    /// Display name of the author.
    pub fn display_name(&self) -> &str {
        match self {
            Sender::Timeline { name, .. } | Sender::Direct { name, .. } => name,
        }
    }

    /// Handle of the author.
    pub fn screen_name(&self) -> &str {
        match self {
            Sender::Timeline { screen_name, .. } | Sender::Direct { screen_name, .. } => {
                screen_name
            }
        }
    }

    /// Build the message answering this sender with `text`.
    ///
    /// Public answers mention the author and reply to the original post.
    pub fn message(&self, text: &str) -> OutboundMessage {
        match self {
            Sender::Timeline {
                status_id,
                screen_name,
                ..
            } => OutboundMessage::reply(*status_id, format!("@{} {}", screen_name, text)),
            Sender::Direct { user_id, .. } => OutboundMessage::direct(*user_id, text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::Target;

    #[test]
    fn test_timeline_answer_is_mentioning_reply() {
        let sender = Sender::Timeline {
            status_id: 1234,
            screen_name: "alice".to_string(),
            name: "Alice".to_string(),
        };

        let message = sender.message("rolls 42 points");
        assert_eq!(message.body, "@alice rolls 42 points");
        assert_eq!(message.target, Target::Reply(1234));
        assert_eq!(sender.display_name(), "Alice");
    }

    #[test]
    fn test_direct_answer() {
        let sender = Sender::Direct {
            user_id: 77,
            screen_name: "bob".to_string(),
            name: "Bob".to_string(),
        };

        let message = sender.message("done");
        assert_eq!(message.body, "done");
        assert_eq!(message.target, Target::Direct(77));
        assert_eq!(sender.screen_name(), "bob");
    }
}
