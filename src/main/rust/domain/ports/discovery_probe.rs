use async_trait::async_trait;

use crate::domain::errors::Result;
use crate::domain::value_objects::DeviceDescriptor;

/// Port for network discovery implementations
#[async_trait]
pub trait DiscoveryProbe: Send + Sync {
    /// Run one probe cycle and return every device that answered.
    ///
    /// Malformed responses are skipped by the implementation; an `Err` means
    /// the probe could not run at all (socket setup, send failure).
    async fn probe_once(&self) -> Result<Vec<DeviceDescriptor>>;
}
