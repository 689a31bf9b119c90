use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

use pipeline_camera_grid::{
    AccessUnit, BackoffPolicy, CameraGridService, ConnectionState, DecoderFactory,
    DeviceCapabilities, DeviceDescriptor, DeviceId, DeviceRegistry, DiscoverySnapshot,
    DomainError, FrameDecoder, FrameReceiver, ManagerConfig, MediaPacket, MetricsReporter,
    PresentationEvent, RegistryConfig, Result, SessionConfig, StreamConnectionManager,
    StreamConnector, StreamTransport,
};

#[derive(Debug, Clone, Copy)]
enum Behaviour {
    Refuse,
    Hang,
    Silent,
    Frames(usize),
    BadPackets(usize),
}

struct FakeConnector {
    behaviour: Behaviour,
    attempts: Mutex<Vec<(Instant, String)>>,
}

impl FakeConnector {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            attempts: Mutex::new(Vec::new()),
        })
    }

    fn attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    fn urls(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, url)| url.clone())
            .collect()
    }
}

#[async_trait]
impl StreamConnector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamTransport>> {
        self.attempts
            .lock()
            .unwrap()
            .push((Instant::now(), url.to_string()));

        if let Behaviour::Hang = self.behaviour {
            std::future::pending::<()>().await;
        }

        let (remaining, kind) = match self.behaviour {
            Behaviour::Refuse => {
                return Err(DomainError::ConnectionFailed {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                })
            }
            Behaviour::Silent | Behaviour::Hang => (0, 2),
            Behaviour::Frames(count) => (count, 2),
            Behaviour::BadPackets(count) => (count, 0),
        };
        Ok(Box::new(FakeTransport { remaining, kind }))
    }
}

/// Yields `remaining` one-byte packets, then goes quiet
struct FakeTransport {
    remaining: usize,
    kind: u8,
}

#[async_trait]
impl StreamTransport for FakeTransport {
    async fn next_packet(&mut self) -> Result<Option<MediaPacket>> {
        if self.remaining == 0 {
            std::future::pending::<()>().await;
        }
        self.remaining -= 1;
        tokio::task::yield_now().await;
        Ok(Some(MediaPacket::rtp(Bytes::from(vec![self.kind]))))
    }

    async fn close(&mut self) {}
}

/// First payload byte: 2 = complete frame, anything else = undecodable
struct ByteDecoder;

impl FrameDecoder for ByteDecoder {
    fn decode(&mut self, packet: &MediaPacket) -> Result<Option<AccessUnit>> {
        match packet.payload.first() {
            Some(2) => Ok(Some(AccessUnit {
                rtp_timestamp: 0,
                keyframe: true,
                data: packet.payload.clone(),
            })),
            _ => Err(DomainError::DecodeFailed("garbage".to_string())),
        }
    }

    fn reset(&mut self) {}
}

struct ByteDecoders;

impl DecoderFactory for ByteDecoders {
    fn create(&self) -> Box<dyn FrameDecoder> {
        Box::new(ByteDecoder)
    }
}

#[derive(Default)]
struct RecordingMetrics {
    devices_lost: AtomicUsize,
    sessions_rejected: AtomicUsize,
    sessions_closed: AtomicUsize,
    decode_failures: AtomicUsize,
    reconnect_attempts: AtomicUsize,
}

impl MetricsReporter for RecordingMetrics {
    fn report_discovery_cycle(&self, _devices_found: usize, _failed: bool) {}
    fn report_registry_size(&self, _devices: usize) {}
    fn report_device_lost(&self, _device_id: &DeviceId) {
        self.devices_lost.fetch_add(1, Ordering::SeqCst);
    }
    fn report_active_sessions(&self, _sessions: usize) {}
    fn report_session_rejected(&self, _device_id: &DeviceId) {
        self.sessions_rejected.fetch_add(1, Ordering::SeqCst);
    }
    fn report_state_change(&self, _device_id: &DeviceId, _state: &ConnectionState) {}
    fn report_reconnect_attempt(&self, _device_id: &DeviceId) {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
    }
    fn report_backoff(&self, _device_id: &DeviceId, _delay_secs: f64) {}
    fn report_frame_delivered(&self, _device_id: &DeviceId) {}
    fn report_frame_dropped(&self, _device_id: &DeviceId) {}
    fn report_decode_failure(&self, _device_id: &DeviceId) {
        self.decode_failures.fetch_add(1, Ordering::SeqCst);
    }
    fn report_input_fps(&self, _device_id: &DeviceId, _fps: f64) {}
    fn report_session_closed(&self, _device_id: &DeviceId) {
        self.sessions_closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn device(name: &str, last_octet: u8) -> DeviceDescriptor {
    DeviceDescriptor::new(
        DeviceId::parse(name).unwrap(),
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)),
        format!("rtsp://10.0.0.{}/profile2/media.smp", last_octet),
        DeviceCapabilities::default(),
        std::time::Instant::now(),
    )
    .unwrap()
}

fn id(name: &str) -> DeviceId {
    DeviceId::parse(name).unwrap()
}

fn snapshot(devices: Vec<DeviceDescriptor>) -> DiscoverySnapshot {
    DiscoverySnapshot::new(std::time::Instant::now(), devices)
}

fn manager(
    connector: Arc<FakeConnector>,
    metrics: Arc<RecordingMetrics>,
    max_sessions: usize,
) -> StreamConnectionManager {
    StreamConnectionManager::new(
        connector,
        Arc::new(ByteDecoders),
        BackoffPolicy::default(),
        SessionConfig::default(),
        ManagerConfig {
            max_sessions,
            shutdown_timeout: Duration::from_secs(5),
        },
        metrics,
    )
}

fn grid(connector: Arc<FakeConnector>, metrics: Arc<RecordingMetrics>) -> CameraGridService {
    CameraGridService::new(
        DeviceRegistry::new(RegistryConfig::default()),
        manager(connector, metrics.clone(), 50),
        metrics,
    )
}

fn frames_for(events: &mut broadcast::Receiver<PresentationEvent>, name: &str) -> FrameReceiver {
    while let Ok(event) = events.try_recv() {
        if let PresentationEvent::DeviceStreamAdded {
            device_id, frames, ..
        } = event
        {
            if device_id.as_str() == name {
                return frames;
            }
        }
    }
    panic!("no stream added for {}", name);
}

#[tokio::test(start_paused = true)]
async fn test_device_survives_three_missed_probes_and_is_dropped_on_the_fourth() {
    let metrics = Arc::new(RecordingMetrics::default());
    let connector = FakeConnector::new(Behaviour::Silent);
    let mut grid = grid(connector, metrics.clone());
    let mut events = grid.subscribe();

    grid.apply_snapshot(&snapshot(vec![device("cam-a", 1), device("cam-b", 2)]))
        .await;
    assert_eq!(grid.manager().session_count(), 2);

    // A misses three cycles, B misses four.
    for _ in 0..3 {
        let diff = grid.apply_snapshot(&snapshot(vec![])).await;
        assert!(diff.removed.is_empty());
    }
    let diff = grid.apply_snapshot(&snapshot(vec![device("cam-a", 1)])).await;
    assert!(diff.removed.is_empty());
    assert_eq!(grid.registry().get(&id("cam-a")).unwrap().missed_probes(), 0);

    let diff = grid.apply_snapshot(&snapshot(vec![device("cam-a", 1)])).await;
    assert_eq!(diff.removed.len(), 1);
    assert_eq!(diff.removed[0].id(), &id("cam-b"));

    assert!(grid.manager().contains(&id("cam-a")));
    assert!(!grid.manager().contains(&id("cam-b")));
    assert_eq!(metrics.devices_lost.load(Ordering::SeqCst), 1);

    let mut removed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PresentationEvent::DeviceStreamRemoved { device_id } = event {
            removed.push(device_id);
        }
    }
    assert_eq!(removed, vec![id("cam-b")]);

    // Lost devices are gone for good: further empty cycles emit nothing.
    let diff = grid.apply_snapshot(&snapshot(vec![device("cam-a", 1)])).await;
    assert!(diff.removed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_device_backs_off_exponentially() {
    let metrics = Arc::new(RecordingMetrics::default());
    let connector = FakeConnector::new(Behaviour::Refuse);
    let mut manager = manager(connector.clone(), metrics, 50);

    manager.on_device_added(&device("cam-c", 3)).unwrap();
    sleep(Duration::from_secs(240)).await;

    let times = connector.attempt_times();
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps.len() >= 8, "only {} retries", gaps.len());

    let slack = Duration::from_millis(5);
    for (gap, base) in gaps.iter().zip([1u64, 2, 4, 8, 16]) {
        let base = Duration::from_secs(base);
        assert!(*gap >= base, "gap {:?} below {:?}", gap, base);
        assert!(*gap <= base.mul_f64(1.1) + slack, "gap {:?} above {:?}", gap, base);
    }
    for pair in gaps.windows(2) {
        assert!(pair[1] + slack >= pair[0], "delays decreased: {:?}", pair);
    }
    for gap in &gaps {
        assert!(*gap <= Duration::from_secs(30) + slack);
    }

    assert!(manager.session_state(&id("cam-c")).unwrap().is_problematic());
    let status = manager.status_board().get(&id("cam-c")).unwrap();
    assert!(status.last_error.unwrap().contains("connection refused"));
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_removal_while_reconnecting_closes_within_grace() {
    let metrics = Arc::new(RecordingMetrics::default());
    let connector = FakeConnector::new(Behaviour::Refuse);
    let mut manager = manager(connector.clone(), metrics.clone(), 50);
    let cam = id("cam-c");

    manager.on_device_added(&device("cam-c", 3)).unwrap();
    sleep(Duration::from_millis(1500)).await;
    assert!(matches!(
        manager.session_state(&cam),
        Some(ConnectionState::Reconnecting { .. })
    ));

    let started = Instant::now();
    assert!(manager.on_device_removed(&cam).await);
    assert!(started.elapsed() < SessionConfig::default().close_grace());

    let attempts = connector.attempts();
    sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), attempts);
    assert_eq!(metrics.sessions_closed.load(Ordering::SeqCst), 1);
    assert!(!manager.on_device_removed(&cam).await);
}

#[tokio::test(start_paused = true)]
async fn test_removal_while_connecting_cancels_the_attempt() {
    let metrics = Arc::new(RecordingMetrics::default());
    let connector = FakeConnector::new(Behaviour::Hang);
    let mut manager = manager(connector.clone(), metrics.clone(), 50);
    let cam = id("cam-h");

    manager.on_device_added(&device("cam-h", 9)).unwrap();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(manager.session_state(&cam), Some(ConnectionState::Connecting));
    assert_eq!(connector.attempts(), 1);

    let started = Instant::now();
    assert!(manager.on_device_removed(&cam).await);
    assert!(started.elapsed() < SessionConfig::default().close_grace());
    assert_eq!(manager.session_state(&cam), None);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(metrics.reconnect_attempts.load(Ordering::SeqCst), 0);
    assert_eq!(metrics.sessions_closed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_consumer_sees_only_the_newest_frames() {
    let metrics = Arc::new(RecordingMetrics::default());
    let connector = FakeConnector::new(Behaviour::Frames(20));
    let mut manager = manager(connector, metrics, 50);
    let mut events = manager.subscribe();

    manager.on_device_added(&device("cam-d", 4)).unwrap();
    let frames = frames_for(&mut events, "cam-d");
    sleep(Duration::from_millis(100)).await;

    let capacity = SessionConfig::default().frame_queue_capacity();
    assert_eq!(frames.len(), capacity);

    let mut sequences = Vec::new();
    while let Some(frame) = frames.try_recv() {
        assert_eq!(frame.device_id, id("cam-d"));
        sequences.push(frame.sequence);
    }
    assert_eq!(sequences, vec![16, 17, 18, 19]);

    let status = manager.status_board().get(&id("cam-d")).unwrap();
    assert_eq!(status.frames_delivered, 20);
    assert_eq!(status.frames_dropped, 16);
    assert_eq!(status.state, ConnectionState::Streaming);

    manager.shutdown().await;
    assert!(frames.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_session_limit_leaves_existing_sessions_alone() {
    let metrics = Arc::new(RecordingMetrics::default());
    let connector = FakeConnector::new(Behaviour::Silent);
    let mut manager = manager(connector, metrics.clone(), 2);

    manager.on_device_added(&device("cam-a", 1)).unwrap();
    manager.on_device_added(&device("cam-b", 2)).unwrap();
    let rejected = manager.on_device_added(&device("cam-c", 3));

    assert!(matches!(rejected, Err(DomainError::SessionLimitReached(2))));
    assert_eq!(metrics.sessions_rejected.load(Ordering::SeqCst), 1);

    sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.session_state(&id("cam-a")), Some(ConnectionState::Streaming));
    assert_eq!(manager.session_state(&id("cam-b")), Some(ConnectionState::Streaming));
    assert_eq!(manager.session_state(&id("cam-c")), None);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_three_decode_failures_force_reconnect() {
    let metrics = Arc::new(RecordingMetrics::default());
    let connector = FakeConnector::new(Behaviour::BadPackets(3));
    let mut manager = manager(connector.clone(), metrics.clone(), 50);

    manager.on_device_added(&device("cam-e", 5)).unwrap();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(metrics.decode_failures.load(Ordering::SeqCst), 3);
    assert!(manager.session_state(&id("cam-e")).unwrap().is_problematic());

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(connector.attempts(), 2);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_stream_fails_health_check() {
    let metrics = Arc::new(RecordingMetrics::default());
    let connector = FakeConnector::new(Behaviour::Silent);
    let mut manager = manager(connector.clone(), metrics.clone(), 50);
    let cam = id("cam-f");

    manager.on_device_added(&device("cam-f", 6)).unwrap();
    sleep(Duration::from_millis(4900)).await;
    assert_eq!(manager.session_state(&cam), Some(ConnectionState::Streaming));

    sleep(Duration::from_millis(300)).await;
    assert!(manager.session_state(&cam).unwrap().is_problematic());
    assert_eq!(metrics.reconnect_attempts.load(Ordering::SeqCst), 1);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(manager.session_state(&cam), Some(ConnectionState::Streaming));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_endpoint_change_is_used_on_next_attempt() {
    let metrics = Arc::new(RecordingMetrics::default());
    let connector = FakeConnector::new(Behaviour::Refuse);
    let mut grid = grid(connector.clone(), metrics);

    grid.apply_snapshot(&snapshot(vec![device("cam-g", 7)])).await;
    sleep(Duration::from_millis(500)).await;

    let diff = grid.apply_snapshot(&snapshot(vec![device("cam-g", 8)])).await;
    assert!(diff.refreshed[0].endpoint_changed);

    sleep(Duration::from_secs(1)).await;
    let urls = connector.urls();
    assert_eq!(urls.len(), 2);
    assert_eq!(urls[0], "rtsp://10.0.0.7/profile2/media.smp");
    assert_eq!(urls[1], "rtsp://10.0.0.8/profile2/media.smp");
}
