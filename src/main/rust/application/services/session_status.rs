use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;

use crate::domain::value_objects::{ConnectionState, DeviceDescriptor, DeviceId};

/// Point-in-time view of one stream session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub device_id: DeviceId,
    /// ONVIF `name` scope, when the camera advertises one
    pub name: Option<String>,
    pub address: IpAddr,
    pub stream_url: String,
    #[serde(serialize_with = "serialize_state")]
    pub state: ConnectionState,
    pub retry_count: u32,
    #[serde(skip)]
    pub next_retry_at: Option<Instant>,
    /// Why the session last left Streaming or Connecting
    pub last_error: Option<String>,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
    pub decode_failures: u64,
    pub input_fps: f64,
}

impl SessionStatus {
    pub fn new(device: &DeviceDescriptor) -> Self {
        Self {
            device_id: device.id().clone(),
            name: device_name(device),
            address: device.address(),
            stream_url: device.stream_url().to_string(),
            state: ConnectionState::Idle,
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
            frames_delivered: 0,
            frames_dropped: 0,
            decode_failures: 0,
            input_fps: 0.0,
        }
    }
}

pub(crate) fn device_name(device: &DeviceDescriptor) -> Option<String> {
    device
        .capabilities()
        .scope_value("name")
        .map(str::to_string)
}

fn serialize_state<S: serde::Serializer>(
    state: &ConnectionState,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(state)
}

/// Shared read-only index of live session statuses
///
/// Written by the connection manager, read by the status endpoint.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    sessions: Arc<RwLock<HashMap<DeviceId, watch::Receiver<SessionStatus>>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, device_id: DeviceId, status: watch::Receiver<SessionStatus>) {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.insert(device_id, status);
    }

    pub(crate) fn remove(&self, device_id: &DeviceId) {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.remove(device_id);
    }

    pub fn get(&self, device_id: &DeviceId) -> Option<SessionStatus> {
        let sessions = self
            .sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.get(device_id).map(|rx| rx.borrow().clone())
    }

    /// All sessions, ordered by device id
    pub fn snapshot(&self) -> Vec<SessionStatus> {
        let sessions = self
            .sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut statuses: Vec<SessionStatus> =
            sessions.values().map(|rx| rx.borrow().clone()).collect();
        statuses.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        statuses
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::DeviceCapabilities;
    use std::net::Ipv4Addr;

    #[test]
    fn test_name_comes_from_scope() {
        let descriptor = DeviceDescriptor::new(
            DeviceId::parse("cam-lobby").unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)),
            "rtsp://10.0.0.9/stream".to_string(),
            DeviceCapabilities {
                scopes: vec![
                    "onvif://www.onvif.org/type/video_encoder".to_string(),
                    "onvif://www.onvif.org/name/Lobby".to_string(),
                ],
                ..Default::default()
            },
            Instant::now(),
        )
        .unwrap();

        let status = SessionStatus::new(&descriptor);
        assert_eq!(status.name.as_deref(), Some("Lobby"));
        assert!(status.last_error.is_none());
    }

    fn status(name: &str) -> SessionStatus {
        let descriptor = DeviceDescriptor::new(
            DeviceId::parse(name).unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            "rtsp://10.0.0.1/stream".to_string(),
            DeviceCapabilities::default(),
            Instant::now(),
        )
        .unwrap();
        SessionStatus::new(&descriptor)
    }

    #[test]
    fn test_board_tracks_latest_status() {
        let board = StatusBoard::new();
        let (tx, rx) = watch::channel(status("cam-b"));
        board.insert(DeviceId::parse("cam-b").unwrap(), rx);
        let (_tx_a, rx_a) = watch::channel(status("cam-a"));
        board.insert(DeviceId::parse("cam-a").unwrap(), rx_a);

        tx.send_modify(|s| s.state = ConnectionState::Streaming);

        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].device_id.as_str(), "cam-a");
        assert_eq!(snapshot[1].state, ConnectionState::Streaming);

        board.remove(&DeviceId::parse("cam-b").unwrap());
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn test_status_serializes_state_as_text() {
        let mut s = status("cam-a");
        s.state = ConnectionState::Reconnecting { attempt: 2 };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["state"], "RECONNECTING (attempt 2)");
        assert_eq!(json["device_id"], "cam-a");
        assert!(json.get("next_retry_at").is_none());
        assert!(json["name"].is_null());
    }
}
