use async_trait::async_trait;

use crate::domain::errors::Result;
use crate::domain::value_objects::MediaPacket;

/// Port for opening a device's stream endpoint
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Open `url` and complete the session handshake.
    /// Only returns once media is flowing or the attempt failed.
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamTransport>>;
}

/// An established media transport
#[async_trait]
pub trait StreamTransport: Send {
    /// Next packet from the remote end; `Ok(None)` on orderly close
    async fn next_packet(&mut self) -> Result<Option<MediaPacket>>;

    /// Tell the remote end the session is over and release the socket
    async fn close(&mut self);
}
