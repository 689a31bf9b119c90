use std::time::Duration;

/// Limits for the stream connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Sessions beyond this count are rejected
    pub max_sessions: usize,
    /// Bound on closing every session at shutdown
    pub shutdown_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_sessions: 50,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}
