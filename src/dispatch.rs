//! Per-stream dispatch.
//!
//! One handler task owns one reassembled connection direction and walks the
//! loop: frame the next message, filter it, emit it if it passes, repeat.
//! The loop ends when the stream does, when framing fails (the byte offset
//! of the next message can no longer be trusted), or when the shutdown token
//! fires. However the loop ends, any unread bytes are drained so the
//! reassembly side is never left waiting on a consumer that will not read.

use std::sync::Arc;

use tokio::io::{AsyncRead, BufReader};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::decode::DecodedMessage;
use crate::filter::FilterConfig;
use crate::flow::FlowIdentity;
use crate::framing::frame_message;

/// Runs the dispatch loop for one connection direction, printing matching
/// messages to stdout.
pub async fn handle_stream<R>(flow: FlowIdentity, reader: R, config: Arc<FilterConfig>, shutdown: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    process_stream(flow, reader, &config, shutdown, &mut |record| print!("{record}")).await;
}

/// The dispatch loop proper, with emission injected for testability.
async fn process_stream<R, F>(
    flow: FlowIdentity,
    reader: R,
    config: &FilterConfig,
    shutdown: CancellationToken,
    emit: &mut F,
) where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut reader = BufReader::new(reader);

    // short-circuit non-matching connections before parsing anything,
    // but still drain so the reassembly side is not blocked
    if !config.network.matches(&flow) {
        trace!(%flow, "connection dropped by network filter");
        drain(&mut reader).await;
        return;
    }

    loop {
        let framed = select! {
            biased;
            () = shutdown.cancelled() => {
                debug!(%flow, "handler cancelled");
                return;
            }
            framed = frame_message(&mut reader) => framed,
        };

        match framed {
            Ok(message) => {
                if config.message.matches(&message) {
                    emit(format_record(&flow, &message, !config.message.suppress_body()));
                } else {
                    trace!(%flow, "message dropped by filter");
                }
            }
            Err(e) if e.is_stream_closed() => {
                debug!(%flow, "stream ended");
                return;
            }
            Err(e) => {
                warn!(%flow, error = %e, "framing failed, abandoning connection");
                drain(&mut reader).await;
                return;
            }
        }
    }
}

/// Formats one emitted record: the 4-tuple, then the rendered message.
fn format_record(flow: &FlowIdentity, message: &DecodedMessage, include_body: bool) -> String {
    let rendered = message.render(include_body);
    format!("{flow}\n{}\n\n", String::from_utf8_lossy(&rendered))
}

/// Reads the stream to its end, discarding everything.
async fn drain<R: AsyncRead + Unpin>(reader: &mut R) {
    let _ = tokio::io::copy(reader, &mut tokio::io::sink()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{MessageFilter, NetworkFilter};
    use http::Method;
    use std::io::Cursor;

    fn flow() -> FlowIdentity {
        FlowIdentity {
            src_ip: "10.0.0.1".parse().unwrap(),
            src_port: 5555,
            dst_ip: "10.0.0.2".parse().unwrap(),
            dst_port: 80,
        }
    }

    async fn run(input: &[u8], config: &FilterConfig) -> Vec<String> {
        let mut records = Vec::new();
        process_stream(
            flow(),
            Cursor::new(input.to_vec()),
            config,
            CancellationToken::new(),
            &mut |record| records.push(record),
        )
        .await;
        records
    }

    #[tokio::test]
    async fn emits_messages_in_stream_order() {
        let wire = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\n\r\n";
        let records = run(wire, &FilterConfig::default()).await;
        assert_eq!(records.len(), 2);
        assert!(records[0].contains("GET /a HTTP/1.1"));
        assert!(records[1].contains("GET /b HTTP/1.1"));
        assert!(records[0].starts_with("10.0.0.1:5555 -> 10.0.0.2:80\n"));
    }

    #[tokio::test]
    async fn filter_mismatch_continues_with_next_message() {
        let wire = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nPOST /b HTTP/1.1\r\nContent-Length: 0\r\n\r\n";
        let config = FilterConfig {
            network: NetworkFilter::default(),
            message: MessageFilter::new(Some(Method::POST), None, false, false, None, false),
        };
        let records = run(wire, &config).await;
        assert_eq!(records.len(), 1);
        assert!(records[0].contains("POST /b"));
    }

    #[tokio::test]
    async fn framing_error_stops_the_handler() {
        let wire = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\ngarbage stream bytes\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
        let records = run(wire, &FilterConfig::default()).await;
        // the message after the framing error is never parsed
        assert_eq!(records.len(), 1);
        assert!(records[0].contains("GET /a"));
    }

    #[tokio::test]
    async fn non_matching_connection_emits_nothing() {
        let wire = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n";
        let config = FilterConfig {
            network: NetworkFilter { dst_port: Some(443), ..NetworkFilter::default() },
            message: MessageFilter::default(),
        };
        let records = run(wire, &config).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn cancelled_handler_returns() {
        let token = CancellationToken::new();
        token.cancel();
        let mut records = Vec::new();
        // a reader that would otherwise block forever is irrelevant here:
        // cancellation is checked before framing completes
        process_stream(
            flow(),
            Cursor::new(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n".to_vec()),
            &FilterConfig::default(),
            token,
            &mut |record| records.push(record),
        )
        .await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn body_suppression_applies_to_output() {
        let wire = b"POST /b HTTP/1.1\r\nContent-Length: 6\r\n\r\nsecret";
        let config = FilterConfig {
            network: NetworkFilter::default(),
            message: MessageFilter::new(None, None, false, false, None, true),
        };
        let records = run(wire, &config).await;
        assert_eq!(records.len(), 1);
        assert!(!records[0].contains("secret"));
    }
}
