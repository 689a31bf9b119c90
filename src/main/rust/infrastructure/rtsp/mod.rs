mod rtp_h264;
mod rtsp_connector;
mod rtsp_message;
mod sdp;

pub use rtp_h264::{H264DecoderFactory, H264Depacketizer, RtpPacket};
pub use rtsp_connector::{RtspConnector, RtspTransport};
pub use rtsp_message::{decode_message, RtspRequest, RtspResponse, ServerMessage, SessionHeader};
pub use sdp::{find_video_track, resolve_control, VideoTrack};
