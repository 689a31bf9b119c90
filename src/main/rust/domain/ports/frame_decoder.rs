use crate::domain::errors::Result;
use crate::domain::value_objects::{AccessUnit, MediaPacket};

/// Port for turning transport packets into access units
pub trait FrameDecoder: Send {
    /// Feed one packet. Returns a unit once one is complete.
    /// An `Err` discards the offending data; the decoder stays usable.
    fn decode(&mut self, packet: &MediaPacket) -> Result<Option<AccessUnit>>;

    /// Drop any partially assembled state (new connection)
    fn reset(&mut self);
}

/// Creates one decoder per stream session
pub trait DecoderFactory: Send + Sync {
    fn create(&self) -> Box<dyn FrameDecoder>;
}
