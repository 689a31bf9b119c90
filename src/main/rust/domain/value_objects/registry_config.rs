/// Debounce settings for the device registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Consecutive missed probe cycles tolerated before a device is lost.
    /// A device is lost on the cycle its counter goes above this value.
    pub missed_probe_threshold: u32,
}

impl RegistryConfig {
    pub fn new(missed_probe_threshold: u32) -> Self {
        Self {
            missed_probe_threshold,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            missed_probe_threshold: 3,
        }
    }
}
