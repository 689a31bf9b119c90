use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

/// WS-Discovery multicast group and port
pub const WS_DISCOVERY_ADDR: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 3702);

/// Settings for the periodic discovery probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Time between the start of consecutive probes
    pub interval: Duration,
    /// How long a probe collects responses
    pub probe_timeout: Duration,
    pub multicast_addr: SocketAddrV4,
    /// Device type queried for, e.g. `dn:NetworkVideoTransmitter`
    pub device_type: String,
    pub rtsp_port: u16,
    /// Path appended to the device host to form the stream URL
    pub rtsp_path: String,
    /// Only devices whose address starts with this prefix are reported
    pub address_prefix: Option<String>,
}

impl DiscoveryConfig {
    pub fn stream_url_for(&self, host: &str) -> String {
        if self.rtsp_port == 554 {
            format!("rtsp://{}{}", host, self.rtsp_path)
        } else {
            format!("rtsp://{}:{}{}", host, self.rtsp_port, self.rtsp_path)
        }
    }

    pub fn accepts_address(&self, address: &str) -> bool {
        self.address_prefix
            .as_deref()
            .map_or(true, |prefix| address.starts_with(prefix))
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(1),
            multicast_addr: WS_DISCOVERY_ADDR,
            device_type: "dn:NetworkVideoTransmitter".to_string(),
            rtsp_port: 554,
            rtsp_path: "/profile2/media.smp".to_string(),
            address_prefix: None,
        }
    }
}
