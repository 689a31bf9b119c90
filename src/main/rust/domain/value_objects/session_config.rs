use std::time::Duration;

use crate::domain::errors::{DomainError, Result};

/// Per-session connection and pipeline settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    connect_timeout: Duration,
    health_check_interval: Duration,
    frame_queue_capacity: usize,
    max_decode_failures: u32,
    close_grace: Duration,
}

impl SessionConfig {
    pub fn new(
        connect_timeout: Duration,
        health_check_interval: Duration,
        frame_queue_capacity: usize,
        max_decode_failures: u32,
        close_grace: Duration,
    ) -> Result<Self> {
        if frame_queue_capacity == 0 {
            return Err(DomainError::InvalidQueueCapacity);
        }

        Ok(Self {
            connect_timeout,
            health_check_interval,
            frame_queue_capacity,
            max_decode_failures: max_decode_failures.max(1),
            close_grace,
        })
    }

    /// Upper bound for opening the endpoint and completing the handshake
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Longest silence tolerated while streaming
    pub fn health_check_interval(&self) -> Duration {
        self.health_check_interval
    }

    pub fn frame_queue_capacity(&self) -> usize {
        self.frame_queue_capacity
    }

    /// Consecutive decode failures that escalate to a stream error
    pub fn max_decode_failures(&self) -> u32 {
        self.max_decode_failures
    }

    /// How long a closing session may take before its task is aborted
    pub fn close_grace(&self) -> Duration {
        self.close_grace
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            health_check_interval: Duration::from_secs(5),
            frame_queue_capacity: 4,
            max_decode_failures: 3,
            close_grace: Duration::from_secs(1),
        }
    }
}
