mod connection_lifecycle;
mod device_registry;
mod fps_meter;
mod reconnect_backoff;
mod registered_device;

pub use connection_lifecycle::{ConnectionLifecycle, StateTransition};
pub use device_registry::{DeviceRegistry, RefreshedDevice, RegistryDiff};
pub use fps_meter::FpsMeter;
pub use reconnect_backoff::ReconnectBackoff;
pub use registered_device::{DeviceStatus, RegisteredDevice};
