mod camera_grid_service;
mod connection_manager;
mod discovery_service;
mod frame_pipeline;
mod frame_queue;
mod presentation_event;
mod session_status;
mod signal;
mod stream_session;

pub use camera_grid_service::CameraGridService;
pub use connection_manager::StreamConnectionManager;
pub use discovery_service::DiscoveryService;
pub use frame_pipeline::{FramePipeline, PacketOutcome, PipelineStats};
pub use frame_queue::{FrameQueue, FrameReceiver};
pub use presentation_event::PresentationEvent;
pub use session_status::{SessionStatus, StatusBoard};
pub use stream_session::{SessionHandle, StreamSession};
