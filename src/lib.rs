//! Passive HTTP/1.x traffic capture.
//!
//! httpcap watches TCP traffic (from a pcap capture file, or live from an
//! interface with the `live` feature), reassembles each connection direction
//! into an ordered byte stream, frames complete HTTP messages out of those
//! streams, and prints the exchanges that match the configured filters.
//!
//! # Architecture
//!
//! Data flows through the modules in this order:
//!
//! - [`capture`]: packet sources; dissects link/network/transport layers
//!   down to TCP segments
//! - [`reassembly`]: orders segments per flow into byte streams and spawns
//!   one handler task per connection direction
//! - [`framing`]: the core engine. Determines, from header content alone,
//!   exactly how many bytes make up the next HTTP message and isolates it
//! - [`decode`]: structural decoding of framed buffers into typed
//!   requests/responses (grammar via `httparse`)
//! - [`filter`]: network- and message-level predicates over immutable
//!   configuration
//! - [`dispatch`]: the per-stream loop tying framing, filtering and output
//!   together
//!
//! The framing engine never sees a length prefix: message boundaries are
//! recovered purely from `Content-Length`, `Transfer-Encoding: chunked`, or
//! method semantics, on streams that arrive incrementally and untrusted. A
//! framing failure poisons only its own connection; every other stream keeps
//! flowing.
//!
//! # Limitations
//!
//! - HTTP/1.x only; HTTP/2 and HTTP/3 framing are not recognized
//! - no TLS: encrypted transport is invisible to the framer
//! - malformed input fails safely per connection, but the parser is not
//!   hardened against deliberately adversarial streams

pub mod capture;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod flow;
pub mod framing;
pub mod reassembly;
