pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{
    CameraGridService, DiscoveryService, FramePipeline, FrameQueue, FrameReceiver,
    PresentationEvent, SessionHandle, SessionStatus, StatusBoard, StreamConnectionManager,
    StreamSession,
};
pub use config::Config;
pub use domain::entities::{
    ConnectionLifecycle, DeviceRegistry, FpsMeter, ReconnectBackoff, RegistryDiff, StateTransition,
};
pub use domain::errors::{DomainError, Result};
pub use domain::ports::{
    DecoderFactory, DiscoveryProbe, FrameDecoder, MetricsReporter, StreamConnector,
    StreamTransport,
};
pub use domain::value_objects::{
    AccessUnit, BackoffPolicy, ConnectionState, DeviceCapabilities, DeviceDescriptor, DeviceId,
    DiscoveryConfig, DiscoverySnapshot, Frame, ManagerConfig, MediaPacket, RegistryConfig,
    SessionConfig,
};
pub use infrastructure::metrics::{serve_metrics, PrometheusReporter};
pub use infrastructure::rtsp::{H264DecoderFactory, RtspConnector};
pub use infrastructure::ws_discovery::WsDiscoveryProbe;
