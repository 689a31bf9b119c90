use lazy_static::lazy_static;
use prometheus::{
    Encoder, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{ConnectionState, DeviceId};

const DEVICE_LABEL: &[&str] = &["device_id"];

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref DISCOVERY_CYCLES: IntCounter = IntCounter::new(
        "discovery_cycles_total",
        "Total number of discovery probe cycles"
    ).expect("metric can be created");

    pub static ref DISCOVERY_FAILURES: IntCounter = IntCounter::new(
        "discovery_failures_total",
        "Discovery cycles whose probe failed"
    ).expect("metric can be created");

    pub static ref DISCOVERED_DEVICES: IntGauge = IntGauge::new(
        "discovery_devices_found",
        "Devices answering the most recent probe"
    ).expect("metric can be created");

    pub static ref REGISTERED_DEVICES: IntGauge = IntGauge::new(
        "registry_devices",
        "Devices currently in the registry"
    ).expect("metric can be created");

    pub static ref DEVICES_LOST: IntCounter = IntCounter::new(
        "registry_devices_lost_total",
        "Devices removed after missing too many probes"
    ).expect("metric can be created");

    pub static ref ACTIVE_SESSIONS: IntGauge = IntGauge::new(
        "stream_sessions_active",
        "Stream sessions currently owned by the connection manager"
    ).expect("metric can be created");

    pub static ref SESSIONS_REJECTED: IntCounter = IntCounter::new(
        "stream_sessions_rejected_total",
        "Devices refused a session because the limit was reached"
    ).expect("metric can be created");

    // Connection state (0=Idle, 1=Connecting, 2=Streaming, 3=Reconnecting, 4=Closed)
    pub static ref CONNECTION_STATE: GaugeVec = GaugeVec::new(
        Opts::new("stream_connection_state", "Current connection state per device"),
        DEVICE_LABEL
    ).expect("metric can be created");

    pub static ref RECONNECT_ATTEMPTS: IntCounterVec = IntCounterVec::new(
        Opts::new("reconnect_attempts_total", "Total number of reconnection attempts"),
        DEVICE_LABEL
    ).expect("metric can be created");

    pub static ref BACKOFF_SECONDS: GaugeVec = GaugeVec::new(
        Opts::new("reconnect_backoff_seconds", "Current reconnection backoff delay"),
        DEVICE_LABEL
    ).expect("metric can be created");

    pub static ref FRAMES_DELIVERED: IntCounterVec = IntCounterVec::new(
        Opts::new("frames_delivered_total", "Frames queued for presentation"),
        DEVICE_LABEL
    ).expect("metric can be created");

    pub static ref FRAMES_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("frames_dropped_total", "Frames evicted from a full queue"),
        DEVICE_LABEL
    ).expect("metric can be created");

    pub static ref DECODE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("decode_failures_total", "Packets that could not be decoded"),
        DEVICE_LABEL
    ).expect("metric can be created");

    pub static ref INPUT_FPS: GaugeVec = GaugeVec::new(
        Opts::new("stream_input_fps", "Decoded frames per second over the FPS window"),
        DEVICE_LABEL
    ).expect("metric can be created");
}

pub struct PrometheusReporter;

impl PrometheusReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn init_metrics() -> Result<(), prometheus::Error> {
        REGISTRY.register(Box::new(DISCOVERY_CYCLES.clone()))?;
        REGISTRY.register(Box::new(DISCOVERY_FAILURES.clone()))?;
        REGISTRY.register(Box::new(DISCOVERED_DEVICES.clone()))?;
        REGISTRY.register(Box::new(REGISTERED_DEVICES.clone()))?;
        REGISTRY.register(Box::new(DEVICES_LOST.clone()))?;
        REGISTRY.register(Box::new(ACTIVE_SESSIONS.clone()))?;
        REGISTRY.register(Box::new(SESSIONS_REJECTED.clone()))?;
        REGISTRY.register(Box::new(CONNECTION_STATE.clone()))?;
        REGISTRY.register(Box::new(RECONNECT_ATTEMPTS.clone()))?;
        REGISTRY.register(Box::new(BACKOFF_SECONDS.clone()))?;
        REGISTRY.register(Box::new(FRAMES_DELIVERED.clone()))?;
        REGISTRY.register(Box::new(FRAMES_DROPPED.clone()))?;
        REGISTRY.register(Box::new(DECODE_FAILURES.clone()))?;
        REGISTRY.register(Box::new(INPUT_FPS.clone()))?;
        Ok(())
    }

    pub fn gather_metrics() -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }
}

impl Default for PrometheusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsReporter for PrometheusReporter {
    fn report_discovery_cycle(&self, devices_found: usize, failed: bool) {
        DISCOVERY_CYCLES.inc();
        if failed {
            DISCOVERY_FAILURES.inc();
        }
        DISCOVERED_DEVICES.set(devices_found as i64);
    }

    fn report_registry_size(&self, devices: usize) {
        REGISTERED_DEVICES.set(devices as i64);
    }

    fn report_device_lost(&self, _device_id: &DeviceId) {
        DEVICES_LOST.inc();
    }

    fn report_active_sessions(&self, sessions: usize) {
        ACTIVE_SESSIONS.set(sessions as i64);
    }

    fn report_session_rejected(&self, _device_id: &DeviceId) {
        SESSIONS_REJECTED.inc();
    }

    fn report_state_change(&self, device_id: &DeviceId, state: &ConnectionState) {
        CONNECTION_STATE
            .with_label_values(&[device_id.as_str()])
            .set(state.as_metric());
    }

    fn report_reconnect_attempt(&self, device_id: &DeviceId) {
        RECONNECT_ATTEMPTS
            .with_label_values(&[device_id.as_str()])
            .inc();
    }

    fn report_backoff(&self, device_id: &DeviceId, delay_secs: f64) {
        BACKOFF_SECONDS
            .with_label_values(&[device_id.as_str()])
            .set(delay_secs);
    }

    fn report_frame_delivered(&self, device_id: &DeviceId) {
        FRAMES_DELIVERED.with_label_values(&[device_id.as_str()]).inc();
    }

    fn report_frame_dropped(&self, device_id: &DeviceId) {
        FRAMES_DROPPED.with_label_values(&[device_id.as_str()]).inc();
    }

    fn report_decode_failure(&self, device_id: &DeviceId) {
        DECODE_FAILURES.with_label_values(&[device_id.as_str()]).inc();
    }

    fn report_input_fps(&self, device_id: &DeviceId, fps: f64) {
        INPUT_FPS.with_label_values(&[device_id.as_str()]).set(fps);
    }

    fn report_session_closed(&self, device_id: &DeviceId) {
        let labels = [device_id.as_str()];
        // Missing series are fine: a session may close before reporting anything.
        let _ = CONNECTION_STATE.remove_label_values(&labels);
        let _ = RECONNECT_ATTEMPTS.remove_label_values(&labels);
        let _ = BACKOFF_SECONDS.remove_label_values(&labels);
        let _ = FRAMES_DELIVERED.remove_label_values(&labels);
        let _ = FRAMES_DROPPED.remove_label_values(&labels);
        let _ = DECODE_FAILURES.remove_label_values(&labels);
        let _ = INPUT_FPS.remove_label_values(&labels);
    }
}
