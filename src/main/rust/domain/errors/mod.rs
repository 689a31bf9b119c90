use std::time::Duration;

use thiserror::Error;

use crate::domain::value_objects::{ConnectionState, DeviceId};

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid stream URL: {0}")]
    InvalidStreamUrl(String),

    #[error("Invalid device identifier: {0:?}")]
    InvalidDeviceId(String),

    #[error("Invalid backoff multiplier: must be > 1.0")]
    InvalidBackoffMultiplier,

    #[error("Invalid backoff delays: initial delay must be > 0 and <= max delay")]
    InvalidBackoffDelays,

    #[error("Invalid backoff jitter {0}: must be within 0.0..=(multiplier - 1.0)")]
    InvalidBackoffJitter(f64),

    #[error("Invalid frame queue capacity: must be at least 1")]
    InvalidQueueCapacity,

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("Discovery probe failed: {0}")]
    DiscoveryFailed(String),

    #[error("Connection to {url} failed: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Stream transport failed: {0}")]
    TransportFailed(String),

    #[error("Stream closed unexpectedly")]
    StreamClosed,

    #[error("No data received within {0:?}")]
    HealthCheckTimeout(Duration),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Decode failed {0} times in a row")]
    DecodeEscalation(u32),

    #[error("Session limit reached: {0} sessions active")]
    SessionLimitReached(usize),

    #[error("Session already exists for device {0}")]
    SessionExists(DeviceId),
}

pub type Result<T> = std::result::Result<T, DomainError>;
