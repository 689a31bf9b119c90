use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::application::services::signal::wait_for_signal;
use crate::application::services::{
    DiscoveryService, PresentationEvent, StatusBoard, StreamConnectionManager,
};
use crate::domain::entities::{DeviceRegistry, RegistryDiff};
use crate::domain::errors::DomainError;
use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{DeviceDescriptor, DiscoverySnapshot};

/// Top-level service: discovery feeds the registry, the registry drives
/// the connection manager.
pub struct CameraGridService {
    registry: DeviceRegistry,
    manager: StreamConnectionManager,
    metrics: Arc<dyn MetricsReporter>,
}

impl CameraGridService {
    pub fn new(
        registry: DeviceRegistry,
        manager: StreamConnectionManager,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Self {
        Self {
            registry,
            manager,
            metrics,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresentationEvent> {
        self.manager.subscribe()
    }

    pub fn status_board(&self) -> StatusBoard {
        self.manager.status_board()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn manager(&self) -> &StreamConnectionManager {
        &self.manager
    }

    /// Reconcile one snapshot and bring sessions in line with the registry
    pub async fn apply_snapshot(&mut self, snapshot: &DiscoverySnapshot) -> RegistryDiff {
        let diff = self.registry.reconcile(snapshot);
        self.metrics.report_registry_size(self.registry.len());
        self.apply_diff(&diff).await;

        if diff.has_lifecycle_changes() {
            tracing::info!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                devices = self.registry.len(),
                sessions = self.manager.session_count(),
                "Registry changed"
            );
        }
        diff
    }

    async fn apply_diff(&mut self, diff: &RegistryDiff) {
        self.manager.reap_finished();

        let lost: Vec<_> = diff
            .removed
            .iter()
            .map(|device| {
                self.metrics.report_device_lost(device.id());
                device.id().clone()
            })
            .collect();
        if !lost.is_empty() {
            self.manager.remove_devices(&lost).await;
        }

        for device in &diff.added {
            self.start_session(device);
        }

        for refreshed in &diff.refreshed {
            if !self.manager.contains(refreshed.descriptor.id()) {
                // Rejected earlier or ended on its own; the device is still here.
                self.start_session(&refreshed.descriptor);
            } else if refreshed.endpoint_changed {
                self.manager.on_device_updated(&refreshed.descriptor);
            }
        }
    }

    fn start_session(&mut self, device: &DeviceDescriptor) {
        match self.manager.on_device_added(device) {
            Ok(()) => {}
            Err(DomainError::SessionLimitReached(_)) => {}
            Err(e) => tracing::warn!(device_id = %device.id(), "Could not start session: {}", e),
        }
    }

    /// Drive discovery and reconciliation until shutdown, then close every
    /// session.
    pub async fn run(mut self, mut discovery: DiscoveryService, mut shutdown: watch::Receiver<bool>) {
        let mut snapshots = discovery.subscribe();
        let discovery_task = tokio::spawn(discovery.run(shutdown.clone()));

        loop {
            let snapshot = tokio::select! {
                _ = wait_for_signal(&mut shutdown) => break,
                snapshot = snapshots.recv() => match snapshot {
                    Some(snapshot) => snapshot,
                    None => break,
                },
            };
            self.apply_snapshot(&snapshot).await;
        }

        tracing::info!("Camera grid shutting down");
        drop(snapshots);
        self.manager.shutdown().await;

        if let Err(e) = discovery_task.await {
            tracing::error!("Discovery task failed: {}", e);
        }
    }
}
