use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{interval_at, timeout, Interval, MissedTickBehavior};
use url::Url;

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{StreamConnector, StreamTransport};
use crate::domain::value_objects::MediaPacket;
use crate::infrastructure::rtsp::{
    decode_message, find_video_track, resolve_control, RtspRequest, RtspResponse, ServerMessage,
};

const DEFAULT_RTSP_PORT: u16 = 554;
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);
const MIN_KEEPALIVE: Duration = Duration::from_secs(1);
const READ_CHUNK: usize = 16 * 1024;
const USER_AGENT: &str = concat!("pipeline-camera-grid/", env!("CARGO_PKG_VERSION"));
const INTERLEAVED_TRANSPORT: &str = "RTP/AVP/TCP;unicast;interleaved=0-1";

/// Opens RTSP sessions with RTP interleaved on the control connection
#[derive(Debug, Clone)]
pub struct RtspConnector {
    request_timeout: Duration,
}

impl RtspConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl StreamConnector for RtspConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamTransport>> {
        let parsed =
            Url::parse(url).map_err(|e| DomainError::InvalidStreamUrl(format!("{}: {}", url, e)))?;
        if parsed.scheme() != "rtsp" {
            return Err(DomainError::InvalidStreamUrl(url.to_string()));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| DomainError::InvalidStreamUrl(url.to_string()))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = parsed.port().unwrap_or(DEFAULT_RTSP_PORT);

        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| DomainError::ConnectionFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        let _ = stream.set_nodelay(true);

        let mut connection = RtspConnection::new(stream, url.to_string(), self.request_timeout);
        let session_timeout = connection.start_playback().await?;

        let period = (session_timeout / 2).max(MIN_KEEPALIVE);
        let mut keepalive = interval_at(tokio::time::Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            url = %url,
            keepalive_secs = period.as_secs(),
            "RTSP session playing"
        );

        Ok(Box::new(RtspTransport {
            connection,
            keepalive,
        }))
    }
}

struct RtspConnection {
    stream: TcpStream,
    read_buf: BytesMut,
    url: String,
    cseq: u32,
    session: Option<String>,
    request_timeout: Duration,
}

impl RtspConnection {
    fn new(stream: TcpStream, url: String, request_timeout: Duration) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            url,
            cseq: 0,
            session: None,
            request_timeout,
        }
    }

    /// OPTIONS, DESCRIBE, SETUP and PLAY. Returns the server's session timeout.
    async fn start_playback(&mut self) -> Result<Duration> {
        let url = self.url.clone();

        self.request(RtspRequest::new("OPTIONS", url.as_str())).await?;

        let describe = self
            .request(RtspRequest::new("DESCRIBE", url.as_str()).header("Accept", "application/sdp"))
            .await?;
        let base = describe
            .header("Content-Base")
            .or_else(|| describe.header("Content-Location"))
            .unwrap_or(url.as_str())
            .to_string();

        let sdp = String::from_utf8_lossy(&describe.body);
        let track = find_video_track(&sdp).ok_or_else(|| self.failure("no video track in SDP"))?;
        if let Some(codec) = track.codec.as_deref() {
            if !codec.eq_ignore_ascii_case("H264") {
                return Err(self.failure(&format!("unsupported video codec {}", codec)));
            }
        }

        let setup = self
            .request(
                RtspRequest::new("SETUP", resolve_control(&base, &track.control))
                    .header("Transport", INTERLEAVED_TRANSPORT),
            )
            .await?;
        let session = setup
            .session()
            .ok_or_else(|| self.failure("SETUP response without Session"))?;
        self.session = Some(session.id);

        self.request(RtspRequest::new("PLAY", base.as_str()).header("Range", "npt=0.000-"))
            .await?;

        Ok(session.timeout.unwrap_or(DEFAULT_SESSION_TIMEOUT))
    }

    async fn request(&mut self, request: RtspRequest) -> Result<RtspResponse> {
        let method = request.method();
        let cseq = self.send(request).await?;

        loop {
            let message = match timeout(self.request_timeout, self.read_message()).await {
                Ok(message) => message?,
                Err(_) => {
                    return Err(self.failure(&format!("timed out waiting for {} response", method)))
                }
            };

            match message {
                ServerMessage::Response(response) if response.cseq().map_or(true, |n| n == cseq) => {
                    if !response.is_success() {
                        return Err(self.failure(&format!(
                            "{} returned {} {}",
                            method, response.status, response.reason
                        )));
                    }
                    return Ok(response);
                }
                _ => continue,
            }
        }
    }

    /// Write a request without waiting for its response. Returns its CSeq.
    async fn send(&mut self, request: RtspRequest) -> Result<u32> {
        self.cseq += 1;
        let mut request = request.header("User-Agent", USER_AGENT);
        if let Some(session) = &self.session {
            request = request.header("Session", session);
        }

        let encoded = request.encode(self.cseq);
        timeout(self.request_timeout, self.stream.write_all(encoded.as_bytes()))
            .await
            .map_err(|_| DomainError::TransportFailed("RTSP write timed out".to_string()))?
            .map_err(|e| DomainError::TransportFailed(e.to_string()))?;
        Ok(self.cseq)
    }

    /// Next message from the server. Cancel safe.
    async fn read_message(&mut self) -> Result<ServerMessage> {
        loop {
            if let Some(message) = decode_message(&mut self.read_buf)? {
                return Ok(message);
            }

            self.read_buf.reserve(READ_CHUNK);
            let read = self
                .stream
                .read_buf(&mut self.read_buf)
                .await
                .map_err(|e| DomainError::TransportFailed(e.to_string()))?;
            if read == 0 {
                return Err(DomainError::StreamClosed);
            }
        }
    }

    fn failure(&self, reason: &str) -> DomainError {
        DomainError::ConnectionFailed {
            url: self.url.clone(),
            reason: reason.to_string(),
        }
    }
}

/// A playing RTSP session yielding interleaved RTP/RTCP packets
pub struct RtspTransport {
    connection: RtspConnection,
    keepalive: Interval,
}

#[async_trait]
impl StreamTransport for RtspTransport {
    async fn next_packet(&mut self) -> Result<Option<MediaPacket>> {
        loop {
            tokio::select! {
                _ = self.keepalive.tick() => {
                    let url = self.connection.url.clone();
                    self.connection.send(RtspRequest::new("GET_PARAMETER", url)).await?;
                }
                message = self.connection.read_message() => match message {
                    Ok(ServerMessage::Interleaved { channel, payload }) => {
                        return Ok(Some(MediaPacket {
                            channel,
                            payload,
                            received_at: Instant::now(),
                        }));
                    }
                    Ok(_) => continue,
                    Err(DomainError::StreamClosed) => return Ok(None),
                    Err(e) => return Err(e),
                },
            }
        }
    }

    async fn close(&mut self) {
        if self.connection.session.is_some() {
            let url = self.connection.url.clone();
            if let Err(e) = self.connection.send(RtspRequest::new("TEARDOWN", url)).await {
                tracing::debug!("TEARDOWN not sent: {}", e);
            }
        }
        let _ = self.connection.stream.shutdown().await;
    }
}
