use std::time::Instant;

use crate::domain::value_objects::{DeviceDescriptor, DeviceId};

/// Registry-side presence of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Discovered,
    Lost,
}

/// A device known to the registry, with its debounce bookkeeping
#[derive(Debug, Clone)]
pub struct RegisteredDevice {
    descriptor: DeviceDescriptor,
    missed_probes: u32,
    status: DeviceStatus,
    first_seen: Instant,
}

impl RegisteredDevice {
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        let first_seen = descriptor.last_seen();
        Self {
            descriptor,
            missed_probes: 0,
            status: DeviceStatus::Discovered,
            first_seen,
        }
    }

    pub fn id(&self) -> &DeviceId {
        self.descriptor.id()
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn missed_probes(&self) -> u32 {
        self.missed_probes
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn first_seen(&self) -> Instant {
        self.first_seen
    }

    /// Replace the descriptor with a newer sighting.
    /// Returns true when the stream endpoint moved.
    pub fn refresh(&mut self, descriptor: DeviceDescriptor) -> bool {
        let endpoint_changed = !self.descriptor.same_endpoint(&descriptor);
        self.descriptor = descriptor;
        self.missed_probes = 0;
        endpoint_changed
    }

    pub fn record_miss(&mut self) -> u32 {
        self.missed_probes = self.missed_probes.saturating_add(1);
        self.missed_probes
    }

    pub fn exceeds(&self, threshold: u32) -> bool {
        self.missed_probes > threshold
    }

    pub fn mark_lost(&mut self) {
        self.status = DeviceStatus::Lost;
    }
}
