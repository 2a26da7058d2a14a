//! Mock posting service for testing.

use crate::application::ports::PostingService;
use crate::domain::error::ServiceError;
use crate::domain::message::OutboundMessage;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    posted: Vec<OutboundMessage>,
    attempts: usize,
    post_failures: VecDeque<ServiceError>,
    display_names: Vec<String>,
    display_name_failure: Option<ServiceError>,
}

/// Posting service that records deliveries and fails on request.
#[derive(Debug, Default)]
pub struct MockPostingService {
    state: Mutex<State>,
}

impl MockPostingService {
    /// Create a service where every call succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next post attempt with `error`. Failures queue up in order.
    pub fn fail_next_post(&self, error: ServiceError) {
        self.lock().post_failures.push_back(error);
    }

    /// Fail every display name change with `error`.
    pub fn fail_display_name(&self, error: ServiceError) {
        self.lock().display_name_failure = Some(error);
    }

    /// Messages that were delivered, in order.
    pub fn posted(&self) -> Vec<OutboundMessage> {
        self.lock().posted.clone()
    }

    /// Number of post calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// Display names that were applied, in order.
    pub fn display_names(&self) -> Vec<String> {
        self.lock().display_names.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect(
            "MockPostingService mutex poisoned - a test thread panicked while holding the lock",
        )
    }
}

#[async_trait]
impl PostingService for MockPostingService {
    async fn post(&self, message: &OutboundMessage) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.attempts += 1;
        if let Some(error) = state.post_failures.pop_front() {
            return Err(error);
        }
        state.posted.push(message.clone());
        Ok(())
    }

    async fn set_display_name(&self, name: &str) -> Result<(), ServiceError> {
        let mut state = self.lock();
        if let Some(error) = &state.display_name_failure {
            return Err(error.clone());
        }
        state.display_names.push(name.to_string());
        Ok(())
    }
}
