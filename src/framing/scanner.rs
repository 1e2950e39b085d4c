//! Byte delimiter scanner.
//!
//! Reads a stream one byte at a time until the bytes read so far end with a
//! literal delimiter sequence, and returns everything consumed including the
//! delimiter itself.
//!
//! The match is a single running counter, not a streaming search automaton:
//! when the next byte matches the next expected delimiter byte the counter
//! advances, otherwise it resets to zero. This is *not* a general substring
//! matcher. A delimiter with self-overlapping structure (say `abab`) can make
//! a failed partial match discard overlap that a correct automaton would
//! retain. The two delimiters HTTP framing needs, `\r\n` and `\r\n\r\n`, have
//! no such ambiguous overlap once the reset byte is rechecked against the
//! first delimiter byte, so the scanner stays correct for them.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A scan failure, carrying how many bytes were consumed before the
/// underlying read error (or end of stream) hit.
///
/// `consumed == 0` on an end-of-stream error means the stream ended cleanly
/// on a message boundary; anything else means the delimiter was cut off.
#[derive(Debug)]
pub struct ScanError {
    pub consumed: usize,
    pub source: io::Error,
}

/// Consumes bytes from `reader` until they end with `delimiter`, returning
/// all bytes read, delimiter included.
///
/// Every call starts with a fresh match counter; no partial-delimiter state
/// carries over between calls. The delimiter must be non-empty.
pub async fn read_until_delimiter<R>(reader: &mut R, delimiter: &[u8]) -> Result<Vec<u8>, ScanError>
where
    R: AsyncRead + Unpin,
{
    if delimiter.is_empty() {
        return Err(ScanError {
            consumed: 0,
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty delimiter"),
        });
    }

    let mut consumed = Vec::new();
    let mut matched = 0;

    loop {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(source) => return Err(ScanError { consumed: consumed.len(), source }),
        };
        consumed.push(byte);

        if byte == delimiter[matched] {
            matched += 1;
        } else if byte == delimiter[0] {
            // the mismatching byte may itself start a new match
            matched = 1;
        } else {
            matched = 0;
        }

        if matched == delimiter.len() {
            return Ok(consumed);
        }
    }
}
