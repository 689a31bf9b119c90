use crate::application::services::{FrameQueue, FrameReceiver};
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::FrameDecoder;
use crate::domain::value_objects::{DeviceId, Frame, MediaPacket};

/// What happened to one ingested packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    /// Packet consumed, no complete frame yet
    Pending,
    /// A frame was queued
    Delivered,
    /// A frame was queued after evicting the oldest undelivered one
    DeliveredWithDrop,
    /// Packet could not be decoded and was discarded
    Discarded,
}

/// Counters for one pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_decoded: u64,
    pub frames_dropped: u64,
    pub decode_failures: u64,
}

/// Per-session decode stage feeding a bounded frame queue
pub struct FramePipeline {
    device_id: DeviceId,
    decoder: Box<dyn FrameDecoder>,
    queue: FrameQueue,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    next_sequence: u64,
    stats: PipelineStats,
}

impl FramePipeline {
    pub fn new(
        device_id: DeviceId,
        decoder: Box<dyn FrameDecoder>,
        queue_capacity: usize,
        max_consecutive_failures: u32,
    ) -> Result<Self> {
        Ok(Self {
            device_id,
            decoder,
            queue: FrameQueue::with_capacity(queue_capacity)?,
            max_consecutive_failures: max_consecutive_failures.max(1),
            consecutive_failures: 0,
            next_sequence: 0,
            stats: PipelineStats::default(),
        })
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn subscribe(&self) -> FrameReceiver {
        self.queue.receiver()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn queue_handle(&self) -> FrameQueue {
        self.queue.clone()
    }

    /// Decode one packet into a frame if it completes one.
    ///
    /// A bad packet is discarded and `Ok(None)` returned; once
    /// `max_consecutive_failures` pile up without a frame decoded in between
    /// this returns [`DomainError::DecodeEscalation`] so the session can
    /// reconnect. Packets off the RTP channel are ignored.
    pub fn decode(&mut self, packet: &MediaPacket) -> Result<Option<Frame>> {
        if !packet.is_rtp() {
            return Ok(None);
        }

        match self.decoder.decode(packet) {
            Ok(None) => Ok(None),
            Ok(Some(unit)) => {
                self.consecutive_failures = 0;
                let frame = Frame::from_access_unit(self.device_id.clone(), self.next_sequence, unit);
                self.next_sequence += 1;
                self.stats.frames_decoded += 1;
                Ok(Some(frame))
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.stats.decode_failures += 1;
                tracing::debug!(
                    device_id = %self.device_id,
                    consecutive = self.consecutive_failures,
                    "Discarding undecodable packet: {}",
                    e
                );

                if self.consecutive_failures >= self.max_consecutive_failures {
                    let failures = self.consecutive_failures;
                    self.consecutive_failures = 0;
                    return Err(DomainError::DecodeEscalation(failures));
                }
                Ok(None)
            }
        }
    }

    /// Decode a packet and queue the resulting frame
    pub fn ingest(&mut self, packet: &MediaPacket) -> Result<PacketOutcome> {
        let failures_before = self.stats.decode_failures;
        let frame = match self.decode(packet)? {
            Some(frame) => frame,
            None if self.stats.decode_failures > failures_before => {
                return Ok(PacketOutcome::Discarded)
            }
            None => return Ok(PacketOutcome::Pending),
        };

        match self.queue.push(frame) {
            Some(_) => {
                self.stats.frames_dropped += 1;
                Ok(PacketOutcome::DeliveredWithDrop)
            }
            None => Ok(PacketOutcome::Delivered),
        }
    }

    /// Forget partial decode state before a new connection
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.consecutive_failures = 0;
    }

    /// Close the delivery queue; receivers drain what is left
    pub fn close(&self) {
        self.queue.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::AccessUnit;
    use bytes::Bytes;

    /// Decoder driven by the first payload byte: 0 = bad, 1 = partial, 2 = complete
    struct ScriptedDecoder {
        resets: usize,
    }

    impl FrameDecoder for ScriptedDecoder {
        fn decode(&mut self, packet: &MediaPacket) -> Result<Option<AccessUnit>> {
            match packet.payload.first() {
                Some(2) => Ok(Some(AccessUnit {
                    rtp_timestamp: 0,
                    keyframe: false,
                    data: packet.payload.clone(),
                })),
                Some(1) => Ok(None),
                _ => Err(DomainError::DecodeFailed("bad packet".to_string())),
            }
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    fn pipeline(capacity: usize) -> FramePipeline {
        FramePipeline::new(
            DeviceId::parse("cam-a").unwrap(),
            Box::new(ScriptedDecoder { resets: 0 }),
            capacity,
            3,
        )
        .unwrap()
    }

    fn packet(kind: u8) -> MediaPacket {
        MediaPacket::rtp(Bytes::from(vec![kind]))
    }

    #[test]
    fn test_frames_are_sequenced() {
        let mut pipeline = pipeline(8);
        let receiver = pipeline.subscribe();

        assert_eq!(pipeline.ingest(&packet(1)).unwrap(), PacketOutcome::Pending);
        assert_eq!(pipeline.ingest(&packet(2)).unwrap(), PacketOutcome::Delivered);
        assert_eq!(pipeline.ingest(&packet(2)).unwrap(), PacketOutcome::Delivered);

        assert_eq!(receiver.try_recv().unwrap().sequence, 0);
        assert_eq!(receiver.try_recv().unwrap().sequence, 1);
    }

    #[test]
    fn test_isolated_decode_errors_are_discarded() {
        let mut pipeline = pipeline(8);

        for _ in 0..5 {
            assert_eq!(pipeline.ingest(&packet(0)).unwrap(), PacketOutcome::Discarded);
            assert_eq!(pipeline.ingest(&packet(0)).unwrap(), PacketOutcome::Discarded);
            assert_eq!(pipeline.ingest(&packet(2)).unwrap(), PacketOutcome::Delivered);
        }
        assert_eq!(pipeline.stats().decode_failures, 10);
    }

    #[test]
    fn test_three_consecutive_failures_escalate() {
        let mut pipeline = pipeline(8);

        assert!(pipeline.ingest(&packet(0)).is_ok());
        assert!(pipeline.ingest(&packet(0)).is_ok());
        let result = pipeline.ingest(&packet(0));
        assert!(matches!(result, Err(DomainError::DecodeEscalation(3))));

        // The run starts over after escalating.
        assert_eq!(pipeline.ingest(&packet(0)).unwrap(), PacketOutcome::Discarded);
    }

    #[test]
    fn test_partial_packets_do_not_clear_failure_run() {
        let mut pipeline = pipeline(8);

        assert!(pipeline.ingest(&packet(0)).is_ok());
        assert_eq!(pipeline.ingest(&packet(1)).unwrap(), PacketOutcome::Pending);
        assert!(pipeline.ingest(&packet(0)).is_ok());
        assert_eq!(pipeline.ingest(&packet(1)).unwrap(), PacketOutcome::Pending);
        let result = pipeline.ingest(&packet(0));
        assert!(matches!(result, Err(DomainError::DecodeEscalation(3))));
    }

    #[test]
    fn test_rtcp_does_not_hide_failures() {
        let mut pipeline = pipeline(8);
        let rtcp = MediaPacket {
            channel: 1,
            ..packet(2)
        };

        assert!(pipeline.ingest(&packet(0)).is_ok());
        assert_eq!(pipeline.ingest(&rtcp).unwrap(), PacketOutcome::Pending);
        assert!(pipeline.ingest(&packet(0)).is_ok());
        assert_eq!(pipeline.ingest(&rtcp).unwrap(), PacketOutcome::Pending);
        let result = pipeline.ingest(&packet(0));
        assert!(matches!(result, Err(DomainError::DecodeEscalation(3))));
        assert_eq!(pipeline.stats().frames_decoded, 0);
    }

    #[test]
    fn test_lost_fragment_does_not_escalate() {
        use crate::infrastructure::rtsp::H264Depacketizer;
        use bytes::{BufMut, BytesMut};

        fn fu_a(sequence: u16, marker: bool, fu_header: u8) -> MediaPacket {
            let mut data = BytesMut::new();
            data.put_u8(0x80);
            data.put_u8(if marker { 0x80 | 96 } else { 96 });
            data.put_u16(sequence);
            data.put_u32(9000);
            data.put_u32(1);
            data.extend_from_slice(&[0x7C, fu_header, 0xAB]);
            MediaPacket::rtp(data.freeze())
        }

        let mut pipeline = FramePipeline::new(
            DeviceId::parse("cam-a").unwrap(),
            Box::new(H264Depacketizer::new()),
            4,
            3,
        )
        .unwrap();

        // Six-fragment frame with sequence 11 lost.
        assert_eq!(pipeline.ingest(&fu_a(10, false, 0x85)).unwrap(), PacketOutcome::Pending);
        assert_eq!(pipeline.ingest(&fu_a(12, false, 0x05)).unwrap(), PacketOutcome::Discarded);
        for sequence in 13..=14 {
            assert_eq!(pipeline.ingest(&fu_a(sequence, false, 0x05)).unwrap(), PacketOutcome::Pending);
        }
        assert_eq!(pipeline.ingest(&fu_a(15, true, 0x45)).unwrap(), PacketOutcome::Pending);
        assert_eq!(pipeline.stats().decode_failures, 1);

        // The next frame arrives intact.
        assert_eq!(pipeline.ingest(&fu_a(16, false, 0x85)).unwrap(), PacketOutcome::Pending);
        assert_eq!(pipeline.ingest(&fu_a(17, true, 0x45)).unwrap(), PacketOutcome::Delivered);
    }

    #[test]
    fn test_saturated_queue_keeps_newest() {
        let mut pipeline = pipeline(2);
        let receiver = pipeline.subscribe();

        pipeline.ingest(&packet(2)).unwrap();
        pipeline.ingest(&packet(2)).unwrap();
        assert_eq!(
            pipeline.ingest(&packet(2)).unwrap(),
            PacketOutcome::DeliveredWithDrop
        );
        assert_eq!(pipeline.queue_len(), 2);
        assert_eq!(pipeline.stats().frames_dropped, 1);

        assert_eq!(receiver.try_recv().unwrap().sequence, 1);
        assert_eq!(receiver.try_recv().unwrap().sequence, 2);
    }

    #[test]
    fn test_reset_clears_failure_run() {
        let mut pipeline = pipeline(2);
        pipeline.ingest(&packet(0)).unwrap();
        pipeline.ingest(&packet(0)).unwrap();
        pipeline.reset();
        assert!(pipeline.ingest(&packet(0)).is_ok());
        assert!(pipeline.ingest(&packet(0)).is_ok());
    }
}
