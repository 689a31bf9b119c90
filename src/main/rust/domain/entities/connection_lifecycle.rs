use std::time::{Duration, Instant};

use crate::domain::errors::{DomainError, Result};
use crate::domain::value_objects::ConnectionState;

/// State transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub timestamp: Instant,
    pub reason: Option<String>,
}

/// Domain entity representing one stream session's connection lifecycle
///
/// Every transition is checked against [`ConnectionState::can_transition_to`];
/// `Closed` is terminal and closing twice is a no-op.
#[derive(Debug)]
pub struct ConnectionLifecycle {
    current_state: ConnectionState,
    last_transition: Option<StateTransition>,
    transition_count: usize,
    streaming_since: Option<Instant>,
    retry_count: u32,
    next_retry_at: Option<Instant>,
}

impl ConnectionLifecycle {
    pub fn new() -> Self {
        Self {
            current_state: ConnectionState::Idle,
            last_transition: None,
            transition_count: 0,
            streaming_since: None,
            retry_count: 0,
            next_retry_at: None,
        }
    }

    pub fn current_state(&self) -> &ConnectionState {
        &self.current_state
    }

    /// Time spent in the current Streaming period
    pub fn uptime(&self) -> Option<Duration> {
        self.streaming_since.map(|start| start.elapsed())
    }

    pub fn transition_count(&self) -> usize {
        self.transition_count
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.last_transition.as_ref()
    }

    /// Failed attempts since the last time the session reached Streaming
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn next_retry_at(&self) -> Option<Instant> {
        self.next_retry_at
    }

    pub fn is_closed(&self) -> bool {
        self.current_state.is_terminal()
    }

    pub fn transition_to_connecting(&mut self) -> Result<()> {
        self.record_transition(ConnectionState::Connecting, None)?;
        self.next_retry_at = None;
        Ok(())
    }

    /// Successful handshake: the retry counter starts over
    pub fn transition_to_streaming(&mut self) -> Result<()> {
        self.record_transition(ConnectionState::Streaming, None)?;
        self.streaming_since = Some(Instant::now());
        self.retry_count = 0;
        self.next_retry_at = None;
        Ok(())
    }

    /// Schedule a retry `delay` from now. Returns the attempt number.
    pub fn transition_to_reconnecting(
        &mut self,
        delay: Duration,
        reason: Option<String>,
    ) -> Result<u32> {
        let attempt = self.retry_count.saturating_add(1);
        self.record_transition(ConnectionState::Reconnecting { attempt }, reason)?;
        self.retry_count = attempt;
        self.streaming_since = None;
        // Unrepresentable deadlines are left unset; the wait itself still runs.
        self.next_retry_at = Instant::now().checked_add(delay);
        Ok(attempt)
    }

    /// Move to the terminal state. Returns false if already closed.
    pub fn close(&mut self, reason: Option<String>) -> bool {
        if self.is_closed() {
            return false;
        }

        // Every non-terminal state may close, so this cannot fail.
        let closed = self.record_transition(ConnectionState::Closed, reason).is_ok();
        self.streaming_since = None;
        self.next_retry_at = None;
        closed
    }

    fn record_transition(&mut self, new_state: ConnectionState, reason: Option<String>) -> Result<()> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(DomainError::InvalidTransition {
                from: self.current_state,
                to: new_state,
            });
        }

        self.last_transition = Some(StateTransition {
            from: self.current_state,
            to: new_state,
            timestamp: Instant::now(),
            reason,
        });
        self.transition_count += 1;
        self.current_state = new_state;
        Ok(())
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
