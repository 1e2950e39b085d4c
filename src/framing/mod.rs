//! Streaming HTTP message framing.
//!
//! The framing engine answers one question about an ordered, possibly still
//! arriving byte stream: how many bytes make up the next complete HTTP
//! message? It has no length prefix to lean on, only the framing rules
//! embedded in the header text (`Content-Length`, `Transfer-Encoding:
//! chunked`, or "no body" for certain methods), and it must leave the stream
//! positioned exactly at the next message so a single connection can carry
//! many messages back to back.
//!
//! The pieces, leaves first:
//!
//! - [`scanner`]: reads up to a literal delimiter sequence
//! - [`classifier`]: turns a header block into a [`FramingDecision`]
//! - [`body`]: consumes fixed-length and chunked bodies wire-exactly
//! - [`frame_message`]: orchestrates the above and hands the isolated
//!   message buffer to the structural decoder

pub mod body;
pub mod classifier;
pub mod scanner;

use std::io;

use tokio::io::AsyncRead;
use tracing::trace;

pub use classifier::{BodyMode, Direction, FramingDecision};

use crate::decode::{self, DecodedMessage};
use crate::error::FrameError;
use crate::framing::body::{read_chunked_body, read_fixed_body};
use crate::framing::scanner::read_until_delimiter;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Isolates the next message's raw bytes from the stream.
///
/// Consumes exactly one message: the header block through its blank line,
/// then the body dictated by the classification. Returns the raw buffer and
/// the decision that framed it. On any failure the stream offset is no
/// longer trustworthy and the caller should abandon the connection.
pub async fn read_raw_message<R>(reader: &mut R) -> Result<(Vec<u8>, FramingDecision), FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = match read_until_delimiter(reader, HEADER_TERMINATOR).await {
        Ok(header) => header,
        Err(scan) if scan.consumed == 0 && scan.source.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::StreamClosed);
        }
        Err(scan) if scan.source.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::truncated("header block"));
        }
        Err(scan) => return Err(scan.source.into()),
    };

    let decision = classifier::classify(&raw)?;
    trace!(?decision, header_len = raw.len(), "classified header block");

    let body = match decision.body {
        BodyMode::None => Vec::new(),
        BodyMode::FixedLength(length) => read_fixed_body(reader, length).await?,
        BodyMode::Chunked => read_chunked_body(reader).await?,
    };
    raw.extend_from_slice(&body);

    Ok((raw, decision))
}

/// Frames one message and structurally decodes it.
///
/// The only side effect is consuming the message's bytes from the stream;
/// afterwards the stream sits at the start of the next message (or at end of
/// stream). [`FrameError::StreamClosed`] signals a clean end between
/// messages; every other error is connection-fatal for the caller.
pub async fn frame_message<R>(reader: &mut R) -> Result<DecodedMessage, FrameError>
where
    R: AsyncRead + Unpin,
{
    let (raw, decision) = read_raw_message(reader).await?;

    let message = match decision.direction {
        Direction::Request => decode::decode_request(&raw)?,
        Direction::Response => decode::decode_response(&raw)?,
    };
    Ok(message)
}
