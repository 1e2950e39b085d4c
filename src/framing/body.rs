//! Body readers.
//!
//! Both readers start with the stream positioned immediately after the header
//! block's terminating blank line and return the raw body bytes exactly as
//! they appear on the wire. For chunked bodies that means the whole envelope:
//! size lines, chunk data with trailing CRLFs, the terminal zero chunk, any
//! trailer lines and the final blank line. De-chunking is the structural
//! decoder's job; the framer only needs to know where the body ends.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::error::FrameError;
use crate::framing::scanner::read_until_delimiter;

const CRLF: &[u8] = b"\r\n";

/// Reads exactly `length` bytes of fixed-length body. A zero length is a
/// no-op. A short read fails the message: the stream ended mid-body.
pub async fn read_fixed_body<R>(reader: &mut R, length: u64) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    if length == 0 {
        return Ok(Vec::new());
    }

    let length = usize::try_from(length)
        .map_err(|_| FrameError::invalid_content_length(format!("{length} does not fit in memory")))?;

    let mut body = vec![0u8; length];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|_| FrameError::truncated("fixed-length body"))?;
    Ok(body)
}

/// Consumes one entire chunked-encoding envelope and returns its raw bytes.
///
/// Loop: read a CRLF-terminated size line, parse the hex size before any `;`
/// extension, then read `size + 2` bytes (the chunk data plus its own CRLF).
/// A parsed size of zero is the terminal chunk; everything through the next
/// blank line (trailer fields included) is consumed so the stream is left
/// positioned exactly at the start of the next message.
pub async fn read_chunked_body<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut body = Vec::new();

    loop {
        let size_line = read_until_delimiter(reader, CRLF)
            .await
            .map_err(|_| FrameError::truncated("chunk size line"))?;
        let size = parse_chunk_size(&size_line)?;
        trace!(size, "read chunk size line");
        body.extend_from_slice(&size_line);

        if size == 0 {
            // trailer section: lines up to and including the blank one
            loop {
                let line = read_until_delimiter(reader, CRLF)
                    .await
                    .map_err(|_| FrameError::truncated("chunk trailer"))?;
                let done = line == CRLF;
                body.extend_from_slice(&line);
                if done {
                    return Ok(body);
                }
            }
        }

        let size = usize::try_from(size)
            .map_err(|_| FrameError::invalid_chunk_size(String::from_utf8_lossy(&size_line)))?;
        let mut chunk = vec![0u8; size + 2];
        reader.read_exact(&mut chunk).await.map_err(|_| FrameError::truncated("chunk data"))?;
        body.extend_from_slice(&chunk);
    }
}

/// Parses the hexadecimal chunk size from a raw size line, ignoring any
/// `;`-separated extensions.
fn parse_chunk_size(line: &[u8]) -> Result<u64, FrameError> {
    let text = String::from_utf8_lossy(line);
    let digits = text.split(';').next().unwrap_or("").trim();
    if digits.is_empty() {
        return Err(FrameError::invalid_chunk_size(text.clone()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| FrameError::invalid_chunk_size(text.clone()))
}
