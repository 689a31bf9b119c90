use std::time::Instant;

use bytes::Bytes;

use crate::domain::value_objects::DeviceId;

/// Interleaved channel carrying RTP for the negotiated video track
pub const RTP_CHANNEL: u8 = 0;

/// One packet read off a stream transport
#[derive(Debug, Clone)]
pub struct MediaPacket {
    /// Interleaved channel the packet arrived on (even = RTP, odd = RTCP)
    pub channel: u8,
    pub payload: Bytes,
    pub received_at: Instant,
}

impl MediaPacket {
    pub fn rtp(payload: Bytes) -> Self {
        Self {
            channel: RTP_CHANNEL,
            payload,
            received_at: Instant::now(),
        }
    }

    pub fn is_rtp(&self) -> bool {
        self.channel % 2 == 0
    }
}

/// A complete encoded picture produced by a decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub rtp_timestamp: u32,
    pub keyframe: bool,
    /// Annex-B byte stream (start-code prefixed NAL units)
    pub data: Bytes,
}

/// A frame ready for presentation
///
/// Cheap to clone: the payload is reference counted.
#[derive(Debug, Clone)]
pub struct Frame {
    pub device_id: DeviceId,
    /// Per-session sequence number, increasing from 0
    pub sequence: u64,
    pub rtp_timestamp: u32,
    pub keyframe: bool,
    pub data: Bytes,
    pub decoded_at: Instant,
}

impl Frame {
    pub fn from_access_unit(device_id: DeviceId, sequence: u64, unit: AccessUnit) -> Self {
        Self {
            device_id,
            sequence,
            rtp_timestamp: unit.rtp_timestamp,
            keyframe: unit.keyframe,
            data: unit.data,
            decoded_at: Instant::now(),
        }
    }
}
