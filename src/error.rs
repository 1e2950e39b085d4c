//! Error types for the capture, framing and decode layers.
//!
//! Errors are split by layer: [`FrameError`] covers everything that can go
//! wrong while isolating one message from a reassembled stream, and is
//! connection-fatal except for [`FrameError::StreamClosed`], which is the
//! normal end of a stream. [`DecodeError`] covers structural decoding of an
//! already-framed buffer and is handled exactly like a framing error.
//! [`CaptureError`] covers the packet source and is fatal for the whole run.

use std::io;
use thiserror::Error;

/// Errors raised while framing one HTTP message out of a byte stream.
///
/// Apart from `StreamClosed`, every variant means the byte offset of the next
/// message can no longer be trusted, so callers abandon the connection rather
/// than attempt to resynchronize.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended before the first byte of a new message. This is the
    /// normal way a connection handler terminates.
    #[error("stream closed")]
    StreamClosed,

    /// The stream ended in the middle of a message.
    #[error("stream ended inside {context}")]
    Truncated { context: &'static str },

    /// The first header line is neither an HTTP status line nor a known
    /// request method.
    #[error("unrecognized message start: {line:?}")]
    UnrecognizedStart { line: String },

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid chunk size line: {line:?}")]
    InvalidChunkSize { line: String },

    #[error("decode error: {source}")]
    Decode {
        #[from]
        source: DecodeError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl FrameError {
    pub fn truncated(context: &'static str) -> Self {
        Self::Truncated { context }
    }

    pub fn unrecognized_start<S: ToString>(line: S) -> Self {
        Self::UnrecognizedStart { line: line.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(reason: S) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }

    pub fn invalid_chunk_size<S: ToString>(line: S) -> Self {
        Self::InvalidChunkSize { line: line.to_string() }
    }

    /// True for the end-of-stream variant that is not a defect of the stream.
    pub fn is_stream_closed(&self) -> bool {
        matches!(self, Self::StreamClosed)
    }
}

/// Errors raised while structurally decoding a complete message buffer.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid message: {reason}")]
    Invalid { reason: String },

    /// The framer handed over a buffer the grammar considers unterminated.
    /// With correct framing this indicates a disagreement between the framing
    /// rules and the message content, e.g. a lying `Content-Length`.
    #[error("message buffer is incomplete")]
    Incomplete,

    #[error("invalid chunked body")]
    InvalidChunk,
}

impl DecodeError {
    pub fn invalid<S: ToString>(reason: S) -> Self {
        Self::Invalid { reason: reason.to_string() }
    }
}

impl From<httparse::Error> for DecodeError {
    fn from(e: httparse::Error) -> Self {
        Self::invalid(e)
    }
}

impl From<http::Error> for DecodeError {
    fn from(e: http::Error) -> Self {
        Self::invalid(e)
    }
}

/// Errors raised by the packet source.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("can't read capture file: {source}")]
    File {
        #[from]
        source: io::Error,
    },

    #[error("malformed capture data: {reason}")]
    Malformed { reason: String },

    #[cfg(feature = "live")]
    #[error("pcap error: {source}")]
    Pcap {
        #[from]
        source: pcap::Error,
    },
}

impl CaptureError {
    pub fn malformed<S: ToString>(reason: S) -> Self {
        Self::Malformed { reason: reason.to_string() }
    }
}
