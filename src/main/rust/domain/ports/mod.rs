mod discovery_probe;
mod frame_decoder;
mod metrics_reporter;
mod stream_connector;

pub use discovery_probe::DiscoveryProbe;
pub use frame_decoder::{DecoderFactory, FrameDecoder};
pub use metrics_reporter::MetricsReporter;
pub use stream_connector::{StreamConnector, StreamTransport};
