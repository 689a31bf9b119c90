use std::time::Duration;

use clap::Parser;

use crate::domain::value_objects::{
    BackoffPolicy, DiscoveryConfig, ManagerConfig, RegistryConfig, SessionConfig,
    WS_DISCOVERY_ADDR,
};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pipeline-camera-grid",
    version = "0.1.0",
    author = "Hawkeye Video Pipeline",
    about = "Discovers ONVIF cameras and keeps one RTSP stream open per camera"
)]
pub struct Config {
    /// Time between discovery probes in milliseconds
    #[arg(long, env = "DISCOVERY_INTERVAL_MS", default_value = "1000")]
    pub discovery_interval_ms: u64,

    /// How long each probe collects responses, in milliseconds
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value = "1000")]
    pub probe_timeout_ms: u64,

    /// Consecutive missed probes tolerated before a device is dropped
    #[arg(long, env = "MISSED_PROBE_THRESHOLD", default_value = "3")]
    pub missed_probe_threshold: u32,

    /// Only keep devices whose address starts with this prefix
    #[arg(long, env = "ADDRESS_PREFIX")]
    pub address_prefix: Option<String>,

    /// RTSP port on discovered devices
    #[arg(long, env = "RTSP_PORT", default_value = "554")]
    pub rtsp_port: u16,

    /// RTSP path on discovered devices
    #[arg(long, env = "RTSP_PATH", default_value = "/profile2/media.smp")]
    pub rtsp_path: String,

    /// Initial reconnection delay in seconds
    #[arg(long, default_value = "1")]
    pub reconnect_initial_delay: u64,

    /// Maximum reconnection delay in seconds
    #[arg(long, default_value = "30")]
    pub reconnect_max_delay: u64,

    /// Reconnection backoff multiplier
    #[arg(long, default_value = "2.0")]
    pub reconnect_multiplier: f64,

    /// Largest upward jitter, as a fraction of the delay
    #[arg(long, default_value = "0.1")]
    pub reconnect_jitter: f64,

    /// Connect and handshake timeout in seconds
    #[arg(long, default_value = "3")]
    pub connect_timeout: u64,

    /// Longest silence on a stream before it is considered dead, in seconds
    #[arg(long, default_value = "5")]
    pub health_check_interval: u64,

    /// Frames buffered per camera before the oldest is dropped
    #[arg(long, default_value = "4")]
    pub frame_queue_capacity: usize,

    /// Consecutive decode failures that force a reconnect
    #[arg(long, default_value = "3")]
    pub max_decode_failures: u32,

    /// Maximum number of concurrent camera sessions
    #[arg(long, env = "MAX_SESSIONS", default_value = "50")]
    pub max_sessions: usize,

    /// Time a closing session gets before it is aborted, in milliseconds
    #[arg(long, default_value = "1000")]
    pub close_grace_ms: u64,

    /// Time allowed for closing all sessions at shutdown, in seconds
    #[arg(long, default_value = "5")]
    pub shutdown_timeout: u64,

    /// Metrics server port
    #[arg(long, env = "METRICS_PORT", default_value = "9003")]
    pub metrics_port: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

/// Longest reconnection delay accepted, in seconds (one day)
const MAX_RECONNECT_DELAY_SECS: u64 = 86_400;

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.discovery_interval_ms == 0 {
            anyhow::bail!("Discovery interval cannot be 0");
        }

        if self.probe_timeout_ms == 0 {
            anyhow::bail!("Probe timeout cannot be 0");
        }

        if self.probe_timeout_ms > self.discovery_interval_ms {
            anyhow::bail!(
                "Probe timeout ({} ms) cannot exceed the discovery interval ({} ms)",
                self.probe_timeout_ms,
                self.discovery_interval_ms
            );
        }

        if self.rtsp_port == 0 {
            anyhow::bail!("Invalid RTSP port: port cannot be 0");
        }

        if !self.rtsp_path.starts_with('/') {
            anyhow::bail!("RTSP path must start with /");
        }

        Self::validate_port(self.metrics_port, "metrics")?;

        if self.reconnect_multiplier <= 1.0 {
            anyhow::bail!("Reconnect multiplier must be > 1.0");
        }

        if self.reconnect_initial_delay == 0 {
            anyhow::bail!("Initial reconnection delay cannot be 0");
        }

        if self.reconnect_max_delay > MAX_RECONNECT_DELAY_SECS {
            anyhow::bail!(
                "Maximum reconnection delay ({}) cannot exceed {} seconds",
                self.reconnect_max_delay,
                MAX_RECONNECT_DELAY_SECS
            );
        }

        if self.reconnect_max_delay < self.reconnect_initial_delay {
            anyhow::bail!(
                "Maximum reconnection delay ({}) cannot be less than initial delay ({})",
                self.reconnect_max_delay,
                self.reconnect_initial_delay
            );
        }

        if !(0.0..=self.reconnect_multiplier - 1.0).contains(&self.reconnect_jitter) {
            anyhow::bail!(
                "Reconnect jitter must be between 0 and multiplier - 1 ({})",
                self.reconnect_multiplier - 1.0
            );
        }

        if self.connect_timeout == 0 || self.health_check_interval == 0 {
            anyhow::bail!("Connect timeout and health check interval cannot be 0");
        }

        if self.frame_queue_capacity == 0 {
            anyhow::bail!("Frame queue capacity must be at least 1");
        }

        if self.max_sessions == 0 {
            anyhow::bail!("Maximum sessions must be at least 1");
        }

        Ok(())
    }

    fn validate_port(port: u16, name: &str) -> anyhow::Result<()> {
        if port == 0 {
            anyhow::bail!("Invalid {} port: port cannot be 0", name);
        }
        if port < MIN_USER_PORT {
            anyhow::bail!(
                "Invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
                name,
                port,
                MIN_USER_PORT,
                MIN_USER_PORT
            );
        }
        Ok(())
    }

    pub fn to_backoff_policy(&self) -> crate::domain::errors::Result<BackoffPolicy> {
        BackoffPolicy::new(
            Duration::from_secs(self.reconnect_initial_delay),
            Duration::from_secs(self.reconnect_max_delay),
            self.reconnect_multiplier,
            self.reconnect_jitter,
        )
    }

    pub fn to_registry_config(&self) -> RegistryConfig {
        RegistryConfig::new(self.missed_probe_threshold)
    }

    pub fn to_session_config(&self) -> crate::domain::errors::Result<SessionConfig> {
        SessionConfig::new(
            Duration::from_secs(self.connect_timeout),
            Duration::from_secs(self.health_check_interval),
            self.frame_queue_capacity,
            self.max_decode_failures,
            Duration::from_millis(self.close_grace_ms),
        )
    }

    pub fn to_manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            max_sessions: self.max_sessions,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout),
        }
    }

    pub fn to_discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            interval: Duration::from_millis(self.discovery_interval_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            multicast_addr: WS_DISCOVERY_ADDR,
            rtsp_port: self.rtsp_port,
            rtsp_path: self.rtsp_path.clone(),
            address_prefix: self.address_prefix.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["pipeline-camera-grid"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = parse(&[]);
        assert!(config.validate().is_ok());

        let discovery = config.to_discovery_config();
        assert_eq!(discovery.interval, Duration::from_secs(1));
        assert_eq!(discovery.multicast_addr, WS_DISCOVERY_ADDR);
        assert_eq!(config.to_registry_config().missed_probe_threshold, 3);
        assert_eq!(config.to_manager_config().max_sessions, 50);

        let session = config.to_session_config().unwrap();
        assert_eq!(session.frame_queue_capacity(), 4);
        assert_eq!(session.close_grace(), Duration::from_secs(1));

        let backoff = config.to_backoff_policy().unwrap();
        assert_eq!(backoff.max_delay(), Duration::from_secs(30));
    }

    #[test]
    fn test_rejects_privileged_metrics_port() {
        let config = parse(&["--metrics-port", "80"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_probe_longer_than_interval() {
        let config = parse(&["--probe-timeout-ms", "2000"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_jitter_that_breaks_ordering() {
        let config = parse(&["--reconnect-multiplier", "1.5", "--reconnect-jitter", "0.6"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unbounded_reconnect_delay() {
        let config = parse(&["--reconnect-max-delay", "18446744073709551615"]);
        assert!(config.validate().is_err());

        let config = parse(&["--reconnect-max-delay", "86400"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_address_prefix() {
        let config = parse(&["--address-prefix", "10."]);
        let discovery = config.to_discovery_config();
        assert!(discovery.accepts_address("10.0.0.5"));
        assert!(!discovery.accepts_address("192.168.0.5"));
    }
}
