use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};

use crate::domain::errors::{DomainError, Result};

const HEADER_END: &[u8] = b"\r\n\r\n";
const MAX_HEADER_LEN: usize = 64 * 1024;

/// An RTSP/1.0 request; `CSeq` is added when it is encoded
#[derive(Debug, Clone)]
pub struct RtspRequest {
    method: &'static str,
    uri: String,
    headers: Vec<(&'static str, String)>,
}

impl RtspRequest {
    pub fn new(method: &'static str, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl ToString) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn encode(&self, cseq: u32) -> String {
        let mut out = format!("{} {} RTSP/1.0\r\nCSeq: {}\r\n", self.method, self.uri, cseq);
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out
    }
}

/// Value of a `Session` response header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHeader {
    pub id: String,
    pub timeout: Option<Duration>,
}

impl SessionHeader {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(';');
        let id = parts.next()?.trim();
        if id.is_empty() {
            return None;
        }

        let timeout = parts
            .filter_map(|part| part.trim().strip_prefix("timeout="))
            .find_map(|secs| secs.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        Some(Self {
            id: id.to_string(),
            timeout,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RtspResponse {
    pub status: u16,
    pub reason: String,
    headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RtspResponse {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn cseq(&self) -> Option<u32> {
        self.header("CSeq").and_then(|v| v.trim().parse().ok())
    }

    pub fn session(&self) -> Option<SessionHeader> {
        self.header("Session").and_then(SessionHeader::parse)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything the server can put on the control connection
#[derive(Debug, Clone)]
pub enum ServerMessage {
    Response(RtspResponse),
    /// `$`-framed interleaved binary data
    Interleaved { channel: u8, payload: Bytes },
    /// Server-to-client request, which we do not act on
    Request(String),
}

/// Split one complete message off the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed.
pub fn decode_message(buf: &mut BytesMut) -> Result<Option<ServerMessage>> {
    if buf.is_empty() {
        return Ok(None);
    }

    if buf[0] == b'$' {
        if buf.len() < 4 {
            return Ok(None);
        }
        let len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        if buf.len() < 4 + len {
            return Ok(None);
        }
        let channel = buf[1];
        buf.advance(4);
        let payload = buf.split_to(len).freeze();
        return Ok(Some(ServerMessage::Interleaved { channel, payload }));
    }

    let Some(head_len) = find_header_end(buf) else {
        if buf.len() > MAX_HEADER_LEN {
            return Err(DomainError::TransportFailed(
                "RTSP header exceeds 64 KiB".to_string(),
            ));
        }
        return Ok(None);
    };

    let head = String::from_utf8_lossy(&buf[..head_len]).into_owned();
    let mut lines = head.split("\r\n");
    let start_line = lines.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("Content-Length"))
        .map(|(_, value)| {
            value
                .parse::<usize>()
                .map_err(|_| DomainError::TransportFailed(format!("bad Content-Length: {}", value)))
        })
        .transpose()?
        .unwrap_or(0);

    let total = head_len + HEADER_END.len() + content_length;
    if buf.len() < total {
        return Ok(None);
    }

    let mut message = buf.split_to(total);
    message.advance(head_len + HEADER_END.len());
    let body = message.freeze();

    if !start_line.starts_with("RTSP/") {
        return Ok(Some(ServerMessage::Request(start_line)));
    }

    let mut parts = start_line.splitn(3, ' ');
    let _version = parts.next();
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| DomainError::TransportFailed(format!("bad status line: {}", start_line)))?;
    let reason = parts.next().unwrap_or_default().to_string();

    Ok(Some(ServerMessage::Response(RtspResponse {
        status,
        reason,
        headers,
        body,
    })))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_END.len())
        .position(|window| window == HEADER_END)
}
