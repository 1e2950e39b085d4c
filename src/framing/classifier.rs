//! Header classification.
//!
//! Looks at a raw header block (everything up to and including the blank
//! line) and decides two things before any structural parsing happens: which
//! direction the message travels (request or response) and how its body is
//! framed. The decision is derived once per message and drives the body
//! readers; full header grammar is left to the structural decoder.

use crate::error::FrameError;

/// Message direction, decided from the first header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

/// How the message body is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// No body follows the header block.
    None,
    /// Exactly this many body bytes follow.
    FixedLength(u64),
    /// The body is a chunked-encoding envelope, terminated by a zero chunk.
    Chunked,
}

/// The per-message framing decision: direction plus body mode.
///
/// Invariant: once returned, the decision is consistent with the bytes that
/// follow the header block. `FixedLength(n)` is always followed by reading
/// exactly `n` bytes; `Chunked` by reading chunks through the terminal zero
/// chunk and its trailing blank line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingDecision {
    pub direction: Direction,
    pub body: BodyMode,
}

/// Request methods that never carry a body.
const BODYLESS_METHODS: [&str; 5] = ["GET", "DELETE", "TRACE", "HEAD", "OPTIONS"];

/// Request methods that may carry a body.
const BODIED_METHODS: [&str; 4] = ["CONNECT", "POST", "PUT", "PATCH"];

/// Classifies a raw header block into a [`FramingDecision`].
///
/// Rules, in order:
/// 1. A first line starting with `HTTP` is a response; chunked if a
///    `Transfer-Encoding: chunked` field is present, otherwise fixed-length
///    per `Content-Length` (0 when absent).
/// 2. A bodyless method means a request with no body.
/// 3. A body-carrying method means a request framed like a response body:
///    chunked if marked, else per `Content-Length`.
/// 4. Anything else fails classification.
///
/// Header fields are matched case-insensitively. An unparseable
/// `Content-Length` fails the whole message; no partial decision escapes.
pub fn classify(header: &[u8]) -> Result<FramingDecision, FrameError> {
    let text = String::from_utf8_lossy(header);
    let lines: Vec<&str> = text.split("\r\n").collect();
    let first = lines.first().copied().unwrap_or("");

    if first.starts_with("HTTP") {
        return Ok(FramingDecision { direction: Direction::Response, body: body_mode(&lines)? });
    }

    let method = first.split(' ').next().unwrap_or("");
    if BODYLESS_METHODS.contains(&method) {
        return Ok(FramingDecision { direction: Direction::Request, body: BodyMode::None });
    }
    if BODIED_METHODS.contains(&method) {
        return Ok(FramingDecision { direction: Direction::Request, body: body_mode(&lines)? });
    }

    Err(FrameError::unrecognized_start(first))
}

fn body_mode(lines: &[&str]) -> Result<BodyMode, FrameError> {
    if is_chunked(lines) {
        return Ok(BodyMode::Chunked);
    }
    Ok(BodyMode::FixedLength(content_length(lines)?))
}

/// Finds the first `Content-Length` field and parses its value, defaulting
/// to 0 when the field is absent.
fn content_length(lines: &[&str]) -> Result<u64, FrameError> {
    const KEY: &str = "content-length:";
    for line in lines {
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix(KEY) {
            return value
                .trim()
                .parse::<u64>()
                .map_err(|e| FrameError::invalid_content_length(format!("{value:?}: {e}")));
        }
    }
    Ok(0)
}

fn is_chunked(lines: &[&str]) -> bool {
    const MARKER: &str = "transfer-encoding: chunked";
    lines.iter().any(|line| line.to_ascii_lowercase().starts_with(MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide(header: &str) -> Result<FramingDecision, FrameError> {
        classify(header.as_bytes())
    }

    #[test]
    fn bodyless_request() {
        let decision = decide("GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(decision.direction, Direction::Request);
        assert_eq!(decision.body, BodyMode::None);
    }

    #[test]
    fn all_bodyless_methods() {
        for method in ["GET", "DELETE", "TRACE", "HEAD", "OPTIONS"] {
            let decision = decide(&format!("{method} / HTTP/1.1\r\n\r\n")).unwrap();
            assert_eq!(decision.body, BodyMode::None, "{method}");
        }
    }

    #[test]
    fn request_with_content_length() {
        let decision = decide("POST /submit HTTP/1.1\r\nContent-Length: 42\r\n\r\n").unwrap();
        assert_eq!(decision.direction, Direction::Request);
        assert_eq!(decision.body, BodyMode::FixedLength(42));
    }

    #[test]
    fn chunked_request_is_recognized() {
        let decision = decide("PUT /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n").unwrap();
        assert_eq!(decision.direction, Direction::Request);
        assert_eq!(decision.body, BodyMode::Chunked);
    }

    #[test]
    fn response_with_content_length_case_insensitive() {
        let decision = decide("HTTP/1.1 200 OK\r\ncontent-LENGTH: 7\r\n\r\n").unwrap();
        assert_eq!(decision.direction, Direction::Response);
        assert_eq!(decision.body, BodyMode::FixedLength(7));
    }

    #[test]
    fn response_without_length_defaults_to_zero() {
        let decision = decide("HTTP/1.1 204 No Content\r\nServer: a\r\n\r\n").unwrap();
        assert_eq!(decision.body, BodyMode::FixedLength(0));
    }

    #[test]
    fn chunked_response() {
        let decision = decide("HTTP/1.1 200 OK\r\nTRANSFER-ENCODING: CHUNKED\r\n\r\n").unwrap();
        assert_eq!(decision.body, BodyMode::Chunked);
    }

    #[test]
    fn chunked_wins_over_content_length() {
        let decision =
            decide("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Length: 5\r\n\r\n").unwrap();
        assert_eq!(decision.body, BodyMode::Chunked);
    }

    #[test]
    fn bad_content_length_fails_the_message() {
        let err = decide("HTTP/1.1 200 OK\r\nContent-Length: banana\r\n\r\n").unwrap_err();
        assert!(matches!(err, FrameError::InvalidContentLength { .. }));
    }

    #[test]
    fn unknown_first_line_fails() {
        let err = decide("BREW /coffee HTCPCP/1.0\r\n\r\n").unwrap_err();
        assert!(matches!(err, FrameError::UnrecognizedStart { .. }));
    }

    #[test]
    fn empty_input_fails_with_descriptive_error() {
        let err = classify(b"").unwrap_err();
        match err {
            FrameError::UnrecognizedStart { line } => assert!(line.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
