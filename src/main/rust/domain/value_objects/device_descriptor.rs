use std::net::IpAddr;
use std::time::Instant;

use crate::domain::errors::{DomainError, Result};
use crate::domain::value_objects::DeviceId;

/// Metadata a device advertised in its discovery response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// WS-Discovery `Types`, e.g. `dn:NetworkVideoTransmitter`
    pub types: Vec<String>,
    /// WS-Discovery `Scopes` (vendor, model, location URIs)
    pub scopes: Vec<String>,
    /// Device service addresses (`XAddrs`)
    pub service_addrs: Vec<String>,
}

impl DeviceCapabilities {
    /// Value of the first `onvif://www.onvif.org/<category>/<value>` scope
    pub fn scope_value(&self, category: &str) -> Option<&str> {
        let prefix = format!("onvif://www.onvif.org/{}/", category);
        self.scopes
            .iter()
            .find_map(|scope| scope.strip_prefix(prefix.as_str()))
    }
}

/// One sighting of a device by a discovery probe
///
/// Immutable: a newer sighting produces a new descriptor instead of mutating
/// this one.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    id: DeviceId,
    address: IpAddr,
    stream_url: String,
    capabilities: DeviceCapabilities,
    last_seen: Instant,
}

impl DeviceDescriptor {
    pub fn new(
        id: DeviceId,
        address: IpAddr,
        stream_url: String,
        capabilities: DeviceCapabilities,
        last_seen: Instant,
    ) -> Result<Self> {
        Self::validate_stream_url(&stream_url)?;

        Ok(Self {
            id,
            address,
            stream_url,
            capabilities,
            last_seen,
        })
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// True when both sightings point at the same stream endpoint
    pub fn same_endpoint(&self, other: &DeviceDescriptor) -> bool {
        self.address == other.address && self.stream_url == other.stream_url
    }

    fn validate_stream_url(url: &str) -> Result<()> {
        let host = url.strip_prefix("rtsp://").unwrap_or_default();
        if host.is_empty() || host.starts_with('/') {
            return Err(DomainError::InvalidStreamUrl(url.to_string()));
        }
        Ok(())
    }
}
