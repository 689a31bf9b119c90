use std::collections::HashMap;
use std::time::Instant;

use crate::domain::value_objects::{DeviceDescriptor, DeviceId};

/// Result set of one discovery probe cycle
///
/// Holds at most one descriptor per device; a device answering twice within
/// a cycle keeps its most recent sighting.
#[derive(Debug, Clone)]
pub struct DiscoverySnapshot {
    taken_at: Instant,
    devices: HashMap<DeviceId, DeviceDescriptor>,
}

impl DiscoverySnapshot {
    pub fn new(taken_at: Instant, descriptors: impl IntoIterator<Item = DeviceDescriptor>) -> Self {
        let mut devices: HashMap<DeviceId, DeviceDescriptor> = HashMap::new();
        for descriptor in descriptors {
            match devices.get(descriptor.id()) {
                Some(existing) if existing.last_seen() > descriptor.last_seen() => {}
                _ => {
                    devices.insert(descriptor.id().clone(), descriptor);
                }
            }
        }

        Self { taken_at, devices }
    }

    pub fn empty(taken_at: Instant) -> Self {
        Self {
            taken_at,
            devices: HashMap::new(),
        }
    }

    pub fn taken_at(&self) -> Instant {
        self.taken_at
    }

    pub fn get(&self, id: &DeviceId) -> Option<&DeviceDescriptor> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
