mod backoff_policy;
mod connection_state;
mod device_descriptor;
mod device_id;
mod discovery_config;
mod discovery_snapshot;
mod frame;
mod manager_config;
mod registry_config;
mod session_config;

pub use backoff_policy::BackoffPolicy;
pub use connection_state::ConnectionState;
pub use device_descriptor::{DeviceCapabilities, DeviceDescriptor};
pub use device_id::DeviceId;
pub use discovery_config::{DiscoveryConfig, WS_DISCOVERY_ADDR};
pub use discovery_snapshot::DiscoverySnapshot;
pub use frame::{AccessUnit, Frame, MediaPacket, RTP_CHANNEL};
pub use manager_config::ManagerConfig;
pub use registry_config::RegistryConfig;
pub use session_config::SessionConfig;
