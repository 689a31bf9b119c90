use std::net::IpAddr;

use crate::application::services::FrameReceiver;
use crate::domain::value_objects::DeviceId;

/// Grid-level notification for whatever renders the camera wall
///
/// Frames themselves do not travel on the event channel; an added stream
/// carries the receiver its frames arrive on.
#[derive(Debug, Clone)]
pub enum PresentationEvent {
    DeviceStreamAdded {
        device_id: DeviceId,
        address: IpAddr,
        frames: FrameReceiver,
    },
    DeviceStreamRemoved {
        device_id: DeviceId,
    },
}
