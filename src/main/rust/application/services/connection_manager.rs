use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::application::services::{PresentationEvent, SessionHandle, StatusBoard, StreamSession};
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{DecoderFactory, MetricsReporter, StreamConnector};
use crate::domain::value_objects::{
    BackoffPolicy, ConnectionState, DeviceDescriptor, DeviceId, ManagerConfig, SessionConfig,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Owns one [`StreamSession`] per registered device
///
/// Sessions run as independent tasks, so a device stuck reconnecting never
/// holds up any other. The manager only creates, re-targets and closes them.
pub struct StreamConnectionManager {
    sessions: HashMap<DeviceId, SessionHandle>,
    /// Devices turned away at the session limit, reported once each
    rejected: HashSet<DeviceId>,
    connector: Arc<dyn StreamConnector>,
    decoders: Arc<dyn DecoderFactory>,
    backoff_policy: BackoffPolicy,
    session_config: SessionConfig,
    config: ManagerConfig,
    metrics: Arc<dyn MetricsReporter>,
    events: broadcast::Sender<PresentationEvent>,
    status_board: StatusBoard,
}

impl StreamConnectionManager {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        decoders: Arc<dyn DecoderFactory>,
        backoff_policy: BackoffPolicy,
        session_config: SessionConfig,
        config: ManagerConfig,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sessions: HashMap::new(),
            rejected: HashSet::new(),
            connector,
            decoders,
            backoff_policy,
            session_config,
            config,
            metrics,
            events,
            status_board: StatusBoard::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresentationEvent> {
        self.events.subscribe()
    }

    pub fn status_board(&self) -> StatusBoard {
        self.status_board.clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn contains(&self, device_id: &DeviceId) -> bool {
        self.sessions.contains_key(device_id)
    }

    pub fn session_state(&self, device_id: &DeviceId) -> Option<ConnectionState> {
        self.sessions.get(device_id).map(|handle| handle.state())
    }

    /// Start streaming a newly registered device
    pub fn on_device_added(&mut self, device: &DeviceDescriptor) -> Result<()> {
        let device_id = device.id();
        if self.sessions.contains_key(device_id) {
            return Err(DomainError::SessionExists(device_id.clone()));
        }

        if self.sessions.len() >= self.config.max_sessions {
            if self.rejected.insert(device_id.clone()) {
                tracing::warn!(
                    device_id = %device_id,
                    limit = self.config.max_sessions,
                    "Session limit reached, not connecting"
                );
                self.metrics.report_session_rejected(device_id);
            } else {
                tracing::debug!(device_id = %device_id, "Still over session limit");
            }
            return Err(DomainError::SessionLimitReached(self.config.max_sessions));
        }

        let handle = StreamSession::spawn(
            device.clone(),
            self.connector.clone(),
            self.decoders.create(),
            self.backoff_policy.clone(),
            self.session_config.clone(),
            self.metrics.clone(),
        )?;

        self.rejected.remove(device_id);
        let frames = handle.frames();
        self.status_board
            .insert(device_id.clone(), handle.status_receiver());
        self.sessions.insert(device_id.clone(), handle);
        self.metrics.report_active_sessions(self.sessions.len());

        tracing::info!(
            device_id = %device_id,
            address = %device.address(),
            sessions = self.sessions.len(),
            "Session created"
        );

        // No subscriber is fine; the renderer may attach later.
        let _ = self.events.send(PresentationEvent::DeviceStreamAdded {
            device_id: device_id.clone(),
            address: device.address(),
            frames,
        });
        Ok(())
    }

    /// Point an existing session at a changed endpoint.
    /// Returns false if the device has no session.
    pub fn on_device_updated(&mut self, device: &DeviceDescriptor) -> bool {
        match self.sessions.get(device.id()) {
            Some(handle) => {
                tracing::debug!(device_id = %device.id(), url = %device.stream_url(), "Endpoint update");
                handle.update_endpoint(device.clone());
                true
            }
            None => false,
        }
    }

    /// Close a device's session, whatever state it is in.
    /// Returns false if there was nothing to close.
    pub async fn on_device_removed(&mut self, device_id: &DeviceId) -> bool {
        self.rejected.remove(device_id);
        let Some(handle) = self.detach(device_id) else {
            tracing::debug!(device_id = %device_id, "No session to remove");
            return false;
        };

        handle.close(self.session_config.close_grace()).await;
        self.finish_removal(device_id);
        true
    }

    /// Close several sessions concurrently
    pub async fn remove_devices(&mut self, device_ids: &[DeviceId]) -> usize {
        let grace = self.session_config.close_grace();
        let mut closing = JoinSet::new();

        for device_id in device_ids {
            self.rejected.remove(device_id);
            if let Some(handle) = self.detach(device_id) {
                let device_id = device_id.clone();
                closing.spawn(async move {
                    handle.close(grace).await;
                    device_id
                });
            }
        }

        let mut removed = 0;
        while let Some(joined) = closing.join_next().await {
            match joined {
                Ok(device_id) => {
                    self.finish_removal(&device_id);
                    removed += 1;
                }
                Err(e) => tracing::error!("Session close task failed: {}", e),
            }
        }
        removed
    }

    /// Drop handles whose session task ended on its own
    pub fn reap_finished(&mut self) -> Vec<DeviceId> {
        let finished: Vec<DeviceId> = self
            .sessions
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(device_id, _)| device_id.clone())
            .collect();

        for device_id in &finished {
            tracing::warn!(device_id = %device_id, "Session ended unexpectedly");
            self.detach(device_id);
            self.finish_removal(device_id);
        }
        finished
    }

    /// Close every session, bounded by the configured shutdown timeout
    pub async fn shutdown(&mut self) {
        if self.sessions.is_empty() {
            return;
        }

        let grace = self.session_config.close_grace();
        let device_ids: Vec<DeviceId> = self.sessions.keys().cloned().collect();
        tracing::info!(sessions = device_ids.len(), "Closing all sessions");

        let mut closing = JoinSet::new();
        for (device_id, handle) in self.sessions.drain() {
            self.status_board.remove(&device_id);
            closing.spawn(async move { handle.close(grace).await });
        }

        let drained = timeout(self.config.shutdown_timeout, async {
            while closing.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                "Shutdown timed out, aborting remaining sessions"
            );
            closing.abort_all();
        }

        for device_id in &device_ids {
            self.metrics.report_session_closed(device_id);
            let _ = self.events.send(PresentationEvent::DeviceStreamRemoved {
                device_id: device_id.clone(),
            });
        }
        self.metrics.report_active_sessions(0);
    }

    fn detach(&mut self, device_id: &DeviceId) -> Option<SessionHandle> {
        let handle = self.sessions.remove(device_id)?;
        self.status_board.remove(device_id);
        Some(handle)
    }

    fn finish_removal(&self, device_id: &DeviceId) {
        self.metrics.report_session_closed(device_id);
        self.metrics.report_active_sessions(self.sessions.len());
        let _ = self.events.send(PresentationEvent::DeviceStreamRemoved {
            device_id: device_id.clone(),
        });
        tracing::info!(device_id = %device_id, "Session removed");
    }
}
