mod probe_message;
mod ws_discovery_probe;

pub use probe_message::{build_probe, parse_probe_matches, ProbeMatch, ProbeResponse};
pub use ws_discovery_probe::WsDiscoveryProbe;
