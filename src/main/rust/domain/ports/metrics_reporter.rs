use crate::domain::value_objects::{ConnectionState, DeviceId};

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_discovery_cycle(&self, devices_found: usize, failed: bool);
    fn report_registry_size(&self, devices: usize);
    fn report_device_lost(&self, device_id: &DeviceId);
    fn report_active_sessions(&self, sessions: usize);
    fn report_session_rejected(&self, device_id: &DeviceId);
    fn report_state_change(&self, device_id: &DeviceId, state: &ConnectionState);
    fn report_reconnect_attempt(&self, device_id: &DeviceId);
    fn report_backoff(&self, device_id: &DeviceId, delay_secs: f64);
    fn report_frame_delivered(&self, device_id: &DeviceId);
    fn report_frame_dropped(&self, device_id: &DeviceId);
    fn report_decode_failure(&self, device_id: &DeviceId);
    fn report_input_fps(&self, device_id: &DeviceId, fps: f64);
    /// Session is gone: per-device series should be dropped
    fn report_session_closed(&self, device_id: &DeviceId);
}
