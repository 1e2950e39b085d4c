//! Structural message decoding.
//!
//! The framer isolates the exact byte range of one complete message; this
//! module turns that range into a typed request or response. Grammar is
//! delegated to `httparse` rather than re-implemented: the raw buffer is
//! parsed into method/URI/status, a header map and body bytes, and chunked
//! bodies are de-chunked so the decoded body is the payload concatenation.
//!
//! Both decode paths assume a complete, correctly framed buffer. A buffer
//! the grammar rejects (or considers unterminated) is reported as a
//! [`DecodeError`], which callers treat exactly like a framing error.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};
use httparse::Status;

use crate::error::DecodeError;

/// Maximum number of header fields accepted in one message.
const MAX_HEADER_NUM: usize = 64;

/// One decoded message, tagged by direction.
///
/// Matched exhaustively wherever direction-specific fields (method vs status
/// code) are needed.
#[derive(Debug)]
pub enum DecodedMessage {
    Request(Request<Bytes>),
    Response(Response<Bytes>),
}

impl DecodedMessage {
    /// Renders the message back to HTTP wire-style text: start line, header
    /// fields, blank line, and the body unless suppressed.
    pub fn render(&self, include_body: bool) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            DecodedMessage::Request(request) => {
                out.extend_from_slice(
                    format!("{} {} {:?}\r\n", request.method(), request.uri(), request.version()).as_bytes(),
                );
                render_headers(&mut out, request.headers());
                if include_body {
                    out.extend_from_slice(request.body());
                }
            }
            DecodedMessage::Response(response) => {
                let reason = response.status().canonical_reason().unwrap_or("");
                out.extend_from_slice(
                    format!("{:?} {} {}\r\n", response.version(), response.status().as_u16(), reason).as_bytes(),
                );
                render_headers(&mut out, response.headers());
                if include_body {
                    out.extend_from_slice(response.body());
                }
            }
        }
        out
    }
}

fn render_headers(out: &mut Vec<u8>, headers: &http::HeaderMap) {
    for (name, value) in headers {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

/// Decodes a complete request buffer.
pub fn decode_request(raw: &[u8]) -> Result<DecodedMessage, DecodeError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
    let mut parsed = httparse::Request::new(&mut headers);

    let body_offset = match parsed.parse(raw)? {
        Status::Complete(offset) => offset,
        Status::Partial => return Err(DecodeError::Incomplete),
    };

    // validate the pieces httparse's grammar is looser about before they
    // touch the builder: a poisoned builder would otherwise only surface
    // at the end, or not at all
    let method = parsed.method.ok_or_else(|| DecodeError::invalid("missing method"))?;
    let method = Method::from_bytes(method.as_bytes()).map_err(DecodeError::invalid)?;
    let uri: Uri =
        parsed.path.ok_or_else(|| DecodeError::invalid("missing uri"))?.parse().map_err(DecodeError::invalid)?;

    let mut headers = HeaderMap::new();
    fill_headers(&mut headers, parsed.headers)?;

    let chunked = is_chunked(&headers);
    let body = body_bytes(&raw[body_offset..], chunked)?;

    let mut request =
        Request::builder().method(method).uri(uri).version(version_of(parsed.version)?).body(body)?;
    *request.headers_mut() = headers;
    Ok(DecodedMessage::Request(request))
}

/// Decodes a complete response buffer.
pub fn decode_response(raw: &[u8]) -> Result<DecodedMessage, DecodeError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
    let mut parsed = httparse::Response::new(&mut headers);

    let body_offset = match parsed.parse(raw)? {
        Status::Complete(offset) => offset,
        Status::Partial => return Err(DecodeError::Incomplete),
    };

    let code = parsed.code.ok_or_else(|| DecodeError::invalid("missing status code"))?;
    let status = StatusCode::from_u16(code).map_err(DecodeError::invalid)?;

    let mut headers = HeaderMap::new();
    fill_headers(&mut headers, parsed.headers)?;

    let chunked = is_chunked(&headers);
    let body = body_bytes(&raw[body_offset..], chunked)?;

    let mut response = Response::builder().status(status).version(version_of(parsed.version)?).body(body)?;
    *response.headers_mut() = headers;
    Ok(DecodedMessage::Response(response))
}

fn version_of(version: Option<u8>) -> Result<Version, DecodeError> {
    match version {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        other => Err(DecodeError::invalid(format!("unsupported http version {other:?}"))),
    }
}

fn fill_headers(map: &mut http::HeaderMap, parsed: &[httparse::Header<'_>]) -> Result<(), DecodeError> {
    map.reserve(parsed.len());
    for header in parsed {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(DecodeError::invalid)?;
        let value = HeaderValue::from_bytes(header.value).map_err(DecodeError::invalid)?;
        map.append(name, value);
    }
    Ok(())
}

fn is_chunked(headers: &http::HeaderMap) -> bool {
    headers
        .get(http::header::TRANSFER_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.split(',').any(|token| token.trim().eq_ignore_ascii_case("chunked")))
}

fn body_bytes(raw_body: &[u8], chunked: bool) -> Result<Bytes, DecodeError> {
    if chunked { dechunk(raw_body) } else { Ok(Bytes::copy_from_slice(raw_body)) }
}

/// Concatenates the data of every chunk in a complete chunked envelope.
fn dechunk(envelope: &[u8]) -> Result<Bytes, DecodeError> {
    let mut payload = Vec::new();
    let mut rest = envelope;
    loop {
        let (line_len, size) = match httparse::parse_chunk_size(rest) {
            Ok(Status::Complete(parsed)) => parsed,
            Ok(Status::Partial) => return Err(DecodeError::Incomplete),
            Err(_) => return Err(DecodeError::InvalidChunk),
        };
        if size == 0 {
            return Ok(Bytes::from(payload));
        }
        let size = usize::try_from(size).map_err(|_| DecodeError::InvalidChunk)?;
        let data_end = line_len.checked_add(size).ok_or(DecodeError::InvalidChunk)?;
        // chunk data plus its trailing CRLF must be present
        if rest.len() < data_end + 2 {
            return Err(DecodeError::Incomplete);
        }
        payload.extend_from_slice(&rest[line_len..data_end]);
        rest = &rest[data_end + 2..];
    }
}
