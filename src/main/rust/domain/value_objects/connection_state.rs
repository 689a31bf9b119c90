use std::fmt;

/// Stream session states (pure domain)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Session created, no connection attempted yet
    Idle,
    /// Opening the stream endpoint and negotiating the transport
    Connecting,
    /// Receiving media packets
    Streaming,
    /// Waiting out a backoff delay before the next attempt
    Reconnecting { attempt: u32 },
    /// Terminal: device removed or manager shut down
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Streaming => write!(f, "STREAMING"),
            Self::Reconnecting { attempt } => write!(f, "RECONNECTING (attempt {})", attempt),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

impl ConnectionState {
    /// Convert state to numeric value for metrics
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Connecting => 1.0,
            Self::Streaming => 2.0,
            Self::Reconnecting { .. } => 3.0,
            Self::Closed => 4.0,
        }
    }

    /// Check if state is healthy (streaming)
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// Check if state indicates a problem
    pub fn is_problematic(&self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Transition table of the session state machine.
    pub fn can_transition_to(&self, next: &ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Connecting) => true,
            (Connecting, Streaming) => true,
            (Connecting, Reconnecting { .. }) => true,
            (Streaming, Reconnecting { .. }) => true,
            (Reconnecting { .. }, Connecting) => true,
            _ => false,
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Idle
    }
}
