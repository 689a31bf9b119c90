//! RTP depacketization for H.264 (RFC 6184)
//!
//! Packets are reassembled into Annex-B access units: every NAL unit is
//! prefixed with a four byte start code. An access unit is complete when
//! the RTP marker bit is seen. A unit that fails part way is skipped up to
//! its last packet, so it costs the caller one error rather than one per
//! remaining fragment.
//!
//! ```text
//! single NAL   | F|NRI| type 1-23 | NAL payload ...
//! STAP-A       | F|NRI|    24     | size (16) | NAL | size (16) | NAL ...
//! FU-A         | F|NRI|    28     | S|E|R| type | fragment ...
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{DecoderFactory, FrameDecoder};
use crate::domain::value_objects::{AccessUnit, MediaPacket};

const RTP_VERSION: u8 = 2;
const RTP_HEADER_LEN: usize = 12;
const START_CODE: [u8; 4] = [0, 0, 0, 1];

const NAL_TYPE_IDR: u8 = 5;
const NAL_TYPE_STAP_A: u8 = 24;
const NAL_TYPE_FU_A: u8 = 28;

/// A parsed RTP packet (RFC 3550)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn parse(data: &Bytes) -> Result<Self> {
        if data.len() < RTP_HEADER_LEN {
            return Err(DomainError::DecodeFailed(format!(
                "RTP packet too short: {} bytes",
                data.len()
            )));
        }

        let mut header = &data[..RTP_HEADER_LEN];
        let first = header.get_u8();
        let second = header.get_u8();
        let sequence = header.get_u16();
        let timestamp = header.get_u32();
        let ssrc = header.get_u32();

        if first >> 6 != RTP_VERSION {
            return Err(DomainError::DecodeFailed(format!(
                "unsupported RTP version {}",
                first >> 6
            )));
        }

        let padding = first & 0x20 != 0;
        let extension = first & 0x10 != 0;
        let csrc_count = (first & 0x0F) as usize;

        let mut start = RTP_HEADER_LEN + 4 * csrc_count;
        if extension {
            if data.len() < start + 4 {
                return Err(DomainError::DecodeFailed("truncated RTP extension".to_string()));
            }
            let words = u16::from_be_bytes([data[start + 2], data[start + 3]]) as usize;
            start += 4 + 4 * words;
        }

        let mut end = data.len();
        if padding {
            let pad = data[end - 1] as usize;
            end = end.saturating_sub(pad);
        }
        if start > end {
            return Err(DomainError::DecodeFailed("RTP header exceeds packet".to_string()));
        }

        Ok(Self {
            marker: second & 0x80 != 0,
            payload_type: second & 0x7F,
            sequence,
            timestamp,
            ssrc,
            payload: data.slice(start..end),
        })
    }
}

/// Reassembles H.264 access units from RTP packets
#[derive(Debug, Default)]
pub struct H264Depacketizer {
    access_unit: BytesMut,
    timestamp: Option<u32>,
    keyframe: bool,
    fragment: Option<BytesMut>,
    last_sequence: Option<u16>,
    /// Timestamp of a unit that already failed; its remaining packets are dropped
    skipping: Option<u32>,
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn depacketize(&mut self, rtp: &RtpPacket) -> Result<Option<AccessUnit>> {
        let gap = self
            .last_sequence
            .map_or(false, |last| rtp.sequence != last.wrapping_add(1));
        self.last_sequence = Some(rtp.sequence);

        if self.skipping == Some(rtp.timestamp) {
            if rtp.marker {
                self.skipping = None;
            }
            return Ok(None);
        }
        self.skipping = None;

        if gap && self.fragment.is_some() {
            return Err(DomainError::DecodeFailed(format!(
                "sequence gap inside fragmented NAL unit at {}",
                rtp.sequence
            )));
        }

        if self.timestamp.is_some_and(|ts| ts != rtp.timestamp) && !self.access_unit.is_empty() {
            tracing::debug!(
                timestamp = rtp.timestamp,
                "Access unit ended without marker, discarding"
            );
            self.discard();
        }
        self.timestamp = Some(rtp.timestamp);

        self.push_payload(&rtp.payload)?;

        if rtp.marker && self.fragment.is_none() {
            return Ok(self.take_unit());
        }
        Ok(None)
    }

    fn push_payload(&mut self, payload: &Bytes) -> Result<()> {
        let indicator = *payload
            .first()
            .ok_or_else(|| DomainError::DecodeFailed("empty RTP payload".to_string()))?;
        if indicator & 0x80 != 0 {
            return Err(DomainError::DecodeFailed("forbidden zero bit set".to_string()));
        }

        match indicator & 0x1F {
            1..=23 => {
                self.push_nal(payload);
                Ok(())
            }
            NAL_TYPE_STAP_A => self.push_aggregate(payload.slice(1..)),
            NAL_TYPE_FU_A => self.push_fragment(indicator, payload),
            other => Err(DomainError::DecodeFailed(format!(
                "unsupported packetization type {}",
                other
            ))),
        }
    }

    fn push_aggregate(&mut self, mut rest: Bytes) -> Result<()> {
        while !rest.is_empty() {
            if rest.len() < 2 {
                return Err(DomainError::DecodeFailed("truncated STAP-A".to_string()));
            }
            let size = rest.get_u16() as usize;
            if size == 0 || rest.len() < size {
                return Err(DomainError::DecodeFailed("truncated STAP-A".to_string()));
            }
            let nal = rest.split_to(size);
            self.push_nal(&nal);
        }
        Ok(())
    }

    fn push_fragment(&mut self, indicator: u8, payload: &Bytes) -> Result<()> {
        if payload.len() < 2 {
            return Err(DomainError::DecodeFailed("truncated FU-A".to_string()));
        }
        let fu_header = payload[1];
        let start = fu_header & 0x80 != 0;
        let end = fu_header & 0x40 != 0;

        if start {
            if self.fragment.is_some() {
                return Err(DomainError::DecodeFailed(
                    "FU-A start before previous end".to_string(),
                ));
            }
            let mut nal = BytesMut::with_capacity(payload.len());
            nal.put_u8((indicator & 0xE0) | (fu_header & 0x1F));
            nal.extend_from_slice(&payload[2..]);
            self.fragment = Some(nal);
        } else {
            let fragment = self.fragment.as_mut().ok_or_else(|| {
                DomainError::DecodeFailed("FU-A continuation without start".to_string())
            })?;
            fragment.extend_from_slice(&payload[2..]);
        }

        if end {
            if let Some(nal) = self.fragment.take() {
                self.push_nal(&nal);
            }
        }
        Ok(())
    }

    fn push_nal(&mut self, nal: &[u8]) {
        if nal.first().map_or(false, |header| header & 0x1F == NAL_TYPE_IDR) {
            self.keyframe = true;
        }
        self.access_unit.extend_from_slice(&START_CODE);
        self.access_unit.extend_from_slice(nal);
    }

    fn take_unit(&mut self) -> Option<AccessUnit> {
        if self.access_unit.is_empty() {
            return None;
        }
        let unit = AccessUnit {
            rtp_timestamp: self.timestamp.unwrap_or_default(),
            keyframe: self.keyframe,
            data: self.access_unit.split().freeze(),
        };
        self.keyframe = false;
        Some(unit)
    }

    fn discard(&mut self) {
        self.access_unit.clear();
        self.fragment = None;
        self.keyframe = false;
    }
}

impl FrameDecoder for H264Depacketizer {
    fn decode(&mut self, packet: &MediaPacket) -> Result<Option<AccessUnit>> {
        // Odd channels carry RTCP.
        if !packet.is_rtp() {
            return Ok(None);
        }

        let rtp = RtpPacket::parse(&packet.payload)?;
        let result = self.depacketize(&rtp);
        if result.is_err() {
            self.discard();
            if !rtp.marker {
                self.skipping = Some(rtp.timestamp);
            }
        }
        result
    }

    fn reset(&mut self) {
        self.discard();
        self.timestamp = None;
        self.last_sequence = None;
        self.skipping = None;
    }
}

pub struct H264DecoderFactory;

impl DecoderFactory for H264DecoderFactory {
    fn create(&self) -> Box<dyn FrameDecoder> {
        Box::new(H264Depacketizer::new())
    }
}
