//! Length-prefixed framing over a byte stream.
//!
//! A byte stream has no message boundaries, so every message travels as
//! a frame:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────┐
//! │ varint32 length (1-5)│ payload (length bytes)   │
//! └──────────────────────┴──────────────────────────┘
//! ```
//!
//! Decoding is split in two:
//! - [`FrameDecoder`] is a plain state machine fed one byte at a time.
//!   It never blocks and never allocates more than the configured
//!   maximum frame size, so it can be tested with any chunking.
//! - [`FrameReader`] drives the decoder from an async stream, with one
//!   suspension point per byte read.
//!
//! A bad length prefix is not fatal. The decoder drops it and starts
//! reading a new length from the next byte.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::TransportError;
use crate::varint::{MAX_VARINT32_LEN, encode_varint32, varint32_len};

/// Default cap on a single frame's payload (16 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024;

/// Largest payload [`encode_frame`] accepts.
pub const MAX_ENCODABLE_FRAME: usize = i32::MAX as usize;

/// Prepends a varint32 length to `payload`.
///
/// # Errors
/// [`TransportError::Encoding`] if the payload is longer than
/// `i32::MAX` bytes.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    if payload.len() > MAX_ENCODABLE_FRAME {
        return Err(TransportError::Encoding(payload.len()));
    }
    let len = payload.len() as u32;
    let mut out = Vec::with_capacity(varint32_len(len) + payload.len());
    encode_varint32(len, &mut out);
    out.extend_from_slice(payload);
    Ok(out)
}

// ---------------------------------------------------------------------------
// FrameDecoder
// ---------------------------------------------------------------------------

/// The outcome of feeding one byte to a [`FrameDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameStep {
    /// More bytes are needed.
    Pending,

    /// A complete frame payload. May be empty (a zero-length frame).
    Frame(Vec<u8>),

    /// The length prefix ran past 5 bytes. It was discarded and the
    /// decoder is reading a fresh length.
    Malformed,

    /// The declared length exceeded the maximum frame size. The prefix
    /// was discarded and the decoder is reading a fresh length.
    Oversized(u64),
}

#[derive(Debug)]
enum DecodeState {
    /// Accumulating length bytes. `read` counts bytes consumed so far.
    Length { value: u64, read: usize },

    /// Accumulating exactly `expected` payload bytes.
    Payload { expected: usize, buf: Vec<u8> },
}

impl DecodeState {
    fn fresh() -> Self {
        Self::Length { value: 0, read: 0 }
    }
}

/// Byte-at-a-time frame decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    max_frame_size: usize,
    state: DecodeState,
}

impl FrameDecoder {
    /// Creates a decoder that rejects frames longer than `max_frame_size`.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            state: DecodeState::fresh(),
        }
    }

    /// Returns the configured payload cap.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Returns `true` when the decoder sits exactly between frames.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, DecodeState::Length { read: 0, .. })
    }

    /// Feeds one byte.
    pub fn push(&mut self, byte: u8) -> FrameStep {
        match &mut self.state {
            DecodeState::Length { value, read } => {
                *value |= u64::from(byte & 0x7F) << (7 * *read);
                *read += 1;

                if byte & 0x80 != 0 {
                    if *read >= MAX_VARINT32_LEN {
                        self.state = DecodeState::fresh();
                        return FrameStep::Malformed;
                    }
                    return FrameStep::Pending;
                }

                let len = *value;
                self.state = DecodeState::fresh();
                if len > self.max_frame_size as u64 {
                    return FrameStep::Oversized(len);
                }
                if len == 0 {
                    return FrameStep::Frame(Vec::new());
                }
                let expected = len as usize;
                self.state = DecodeState::Payload {
                    expected,
                    buf: Vec::with_capacity(expected),
                };
                FrameStep::Pending
            }
            DecodeState::Payload { expected, buf } => {
                buf.push(byte);
                if buf.len() < *expected {
                    return FrameStep::Pending;
                }
                let frame = std::mem::take(buf);
                self.state = DecodeState::fresh();
                FrameStep::Frame(frame)
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

// ---------------------------------------------------------------------------
// FrameReader / FrameWriter
// ---------------------------------------------------------------------------

/// Reads frames from an async byte stream.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    decoder: FrameDecoder,
    resyncs: u64,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wraps `inner`, rejecting frames longer than `max_frame_size`.
    pub fn new(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            decoder: FrameDecoder::new(max_frame_size),
            resyncs: 0,
            bytes_read: 0,
        }
    }

    /// How many times a bad length prefix has been skipped.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Total bytes taken from the stream, including those of partial,
    /// malformed, and oversized frames.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Reads the next frame payload.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames.
    /// Malformed and oversized length prefixes are logged and skipped;
    /// they never end the stream.
    ///
    /// Cancel-safe: decoder state lives in the reader, so a dropped call
    /// loses no bytes and the next call picks up mid-frame.
    ///
    /// # Errors
    /// - [`TransportError::ConnectionClosed`] if the stream ends inside
    ///   a frame
    /// - [`TransportError::ReceiveFailed`] on an I/O error
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            let byte = match self.inner.read_u8().await {
                Ok(byte) => byte,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    if self.decoder.is_idle() {
                        return Ok(None);
                    }
                    return Err(TransportError::ConnectionClosed(
                        "stream ended inside a frame".into(),
                    ));
                }
                Err(e) => return Err(TransportError::ReceiveFailed(e)),
            };
            self.bytes_read += 1;

            match self.decoder.push(byte) {
                FrameStep::Pending => {}
                FrameStep::Frame(payload) => return Ok(Some(payload)),
                FrameStep::Malformed => {
                    self.resyncs += 1;
                    tracing::warn!("length prefix longer than 5 bytes, resynchronizing");
                }
                FrameStep::Oversized(len) => {
                    self.resyncs += 1;
                    tracing::warn!(
                        len,
                        max = self.decoder.max_frame_size(),
                        "frame exceeds maximum size, resynchronizing"
                    );
                }
            }
        }
    }
}

/// Writes frames to an async byte stream.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Frames `payload` and writes it out, flushing afterwards.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let frame = encode_frame(payload)?;
        self.inner
            .write_all(&frame)
            .await
            .map_err(TransportError::SendFailed)?;
        self.inner.flush().await.map_err(TransportError::SendFailed)
    }

    /// Shuts down the write side so the peer sees end-of-stream.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }
}
