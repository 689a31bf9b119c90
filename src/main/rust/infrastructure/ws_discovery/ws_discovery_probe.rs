use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::timeout_at;
use url::Url;
use uuid::Uuid;

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::DiscoveryProbe;
use crate::domain::value_objects::{
    DeviceCapabilities, DeviceDescriptor, DeviceId, DiscoveryConfig,
};
use crate::infrastructure::ws_discovery::{build_probe, parse_probe_matches, ProbeMatch};

const MAX_DATAGRAM: usize = 65_535;

/// Multicast WS-Discovery probe for video transmitters
pub struct WsDiscoveryProbe {
    config: DiscoveryConfig,
}

impl WsDiscoveryProbe {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    fn descriptor_for(
        &self,
        probe_match: ProbeMatch,
        source: IpAddr,
        seen: Instant,
    ) -> Option<DeviceDescriptor> {
        if !probe_match.offers_type(&self.config.device_type) {
            return None;
        }

        let host = probe_match
            .xaddrs
            .iter()
            .filter_map(|xaddr| Url::parse(xaddr).ok())
            .find_map(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| source.to_string());
        let address = host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .unwrap_or(source);

        if !self.config.accepts_address(&host) {
            tracing::debug!(host = %host, "Skipping device outside address prefix");
            return None;
        }

        let id = probe_match
            .endpoint_address
            .as_deref()
            .and_then(|raw| DeviceId::parse(raw).ok())
            .or_else(|| DeviceId::parse(&address.to_string()).ok())?;

        let capabilities = DeviceCapabilities {
            types: probe_match.types,
            scopes: probe_match.scopes,
            service_addrs: probe_match.xaddrs,
        };

        match DeviceDescriptor::new(
            id,
            address,
            self.config.stream_url_for(&host),
            capabilities,
            seen,
        ) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                tracing::debug!(host = %host, "Skipping device: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl DiscoveryProbe for WsDiscoveryProbe {
    async fn probe_once(&self) -> Result<Vec<DeviceDescriptor>> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
            .await
            .map_err(|e| DomainError::DiscoveryFailed(format!("bind failed: {}", e)))?;

        let message_id = format!("urn:uuid:{}", Uuid::new_v4());
        let probe = build_probe(&message_id, &self.config.device_type);
        socket
            .send_to(probe.as_bytes(), SocketAddr::V4(self.config.multicast_addr))
            .await
            .map_err(|e| DomainError::DiscoveryFailed(format!("send failed: {}", e)))?;

        let deadline = tokio::time::Instant::now() + self.config.probe_timeout;
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut devices = Vec::new();

        loop {
            let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Err(_) => break,
                Ok(Err(e)) => {
                    tracing::debug!("Discovery receive failed: {}", e);
                    break;
                }
                Ok(Ok(received)) => received,
            };

            let text = String::from_utf8_lossy(&buf[..len]);
            let response = match parse_probe_matches(&text) {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(from = %from, "Ignoring datagram: {}", e);
                    continue;
                }
            };

            if response.relates_to.as_deref() != Some(message_id.as_str()) {
                tracing::debug!(from = %from, "Ignoring response to another probe");
                continue;
            }

            let seen = Instant::now();
            devices.extend(
                response
                    .matches
                    .into_iter()
                    .filter_map(|m| self.descriptor_for(m, from.ip(), seen)),
            );
        }

        tracing::debug!(devices = devices.len(), "Probe window closed");
        Ok(devices)
    }
}
