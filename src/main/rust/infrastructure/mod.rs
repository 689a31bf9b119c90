pub mod metrics;
pub mod rtsp;
pub mod ws_discovery;
