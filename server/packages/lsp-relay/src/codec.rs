//! `Content-Length` framing for the language-server stdio channel.
//!
//! - [`encode_frame`]/[`encode_message`]: emit `Content-Length: N\r\n\r\n{json}`
//! - [`FrameDecoder`]: accumulate stdout chunks and slice complete frames

use serde_json::Value;

pub const CONTENT_LENGTH: &str = "Content-Length";

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame header has no Content-Length: {header:?}")]
    MissingContentLength { header: String },
    #[error("invalid Content-Length value: {value:?}")]
    InvalidContentLength { value: String },
}

pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", payload.len());
    let mut frame = Vec::with_capacity(header.len() + payload.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(payload);
    frame
}

pub fn encode_message(message: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let payload = serde_json::to_vec(message)?;
    Ok(encode_frame(&payload))
}

/// Incremental decoder over the server's output stream.
///
/// Bytes are appended with [`push`](FrameDecoder::push); [`next_frame`](FrameDecoder::next_frame)
/// yields a body only once all `Content-Length` bytes are buffered, so a body is never
/// handed out partially and never twice. A wrong declared length is not detectable and
/// desynchronizes the stream for the rest of the connection.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the next complete frame body, `Ok(None)` when more bytes are needed.
    ///
    /// A header block without a usable `Content-Length` is consumed and reported so the
    /// caller can keep scanning.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let Some(header_end) = find(&self.buffer, HEADER_TERMINATOR) else {
            return Ok(None);
        };
        let body_start = header_end + HEADER_TERMINATOR.len();
        let length = match parse_content_length(&self.buffer[..header_end]) {
            Ok(length) => length,
            Err(err) => {
                self.buffer.drain(..body_start);
                return Err(err);
            }
        };
        let frame_end = body_start + length;
        if self.buffer.len() < frame_end {
            return Ok(None);
        }
        let body = self.buffer[body_start..frame_end].to_vec();
        self.buffer.drain(..frame_end);
        Ok(Some(body))
    }
}

fn parse_content_length(header: &[u8]) -> Result<usize, FrameError> {
    let header = String::from_utf8_lossy(header);
    for line in header.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let value = value.trim();
            return value
                .parse::<usize>()
                .map_err(|_| FrameError::InvalidContentLength {
                    value: value.to_string(),
                });
        }
    }
    Err(FrameError::MissingContentLength {
        header: header.into_owned(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
