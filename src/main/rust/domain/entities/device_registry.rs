use std::collections::HashMap;

use crate::domain::entities::RegisteredDevice;
use crate::domain::value_objects::{DeviceDescriptor, DeviceId, DiscoverySnapshot, RegistryConfig};

/// A known device seen again in the latest snapshot
#[derive(Debug, Clone)]
pub struct RefreshedDevice {
    pub descriptor: DeviceDescriptor,
    /// Address or stream URL differs from the previous sighting
    pub endpoint_changed: bool,
}

/// Outcome of reconciling one snapshot
#[derive(Debug, Clone, Default)]
pub struct RegistryDiff {
    pub added: Vec<DeviceDescriptor>,
    /// Devices declared lost this cycle, already purged from the registry
    pub removed: Vec<RegisteredDevice>,
    pub refreshed: Vec<RefreshedDevice>,
}

impl RegistryDiff {
    /// True when a device joined, left or moved
    pub fn has_lifecycle_changes(&self) -> bool {
        !self.added.is_empty()
            || !self.removed.is_empty()
            || self.refreshed.iter().any(|r| r.endpoint_changed)
    }
}

/// Canonical set of known devices
///
/// Single writer: only the discovery cycle calls [`reconcile`](Self::reconcile).
/// Everyone else learns about changes from the returned [`RegistryDiff`].
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, RegisteredDevice>,
    config: RegistryConfig,
}

impl DeviceRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            devices: HashMap::new(),
            config,
        }
    }

    pub fn reconcile(&mut self, snapshot: &DiscoverySnapshot) -> RegistryDiff {
        let mut diff = RegistryDiff::default();

        for descriptor in snapshot.devices() {
            match self.devices.get_mut(descriptor.id()) {
                Some(known) => {
                    let endpoint_changed = known.refresh(descriptor.clone());
                    diff.refreshed.push(RefreshedDevice {
                        descriptor: descriptor.clone(),
                        endpoint_changed,
                    });
                }
                None => {
                    self.devices
                        .insert(descriptor.id().clone(), RegisteredDevice::new(descriptor.clone()));
                    diff.added.push(descriptor.clone());
                }
            }
        }

        let threshold = self.config.missed_probe_threshold;
        let mut lost = Vec::new();
        for (id, device) in self.devices.iter_mut() {
            if snapshot.contains(id) {
                continue;
            }
            device.record_miss();
            if device.exceeds(threshold) {
                lost.push(id.clone());
            }
        }

        lost.sort();
        for id in lost {
            if let Some(mut device) = self.devices.remove(&id) {
                device.mark_lost();
                tracing::info!(
                    device_id = %id,
                    missed_probes = device.missed_probes(),
                    known_for_secs = device.first_seen().elapsed().as_secs(),
                    "Device lost"
                );
                diff.removed.push(device);
            }
        }

        diff.added.sort_by(|a, b| a.id().cmp(b.id()));
        diff.refreshed
            .sort_by(|a, b| a.descriptor.id().cmp(b.descriptor.id()));
        diff
    }

    pub fn get(&self, id: &DeviceId) -> Option<&RegisteredDevice> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn devices(&self) -> impl Iterator<Item = &RegisteredDevice> {
        self.devices.values()
    }
}
