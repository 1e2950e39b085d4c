//! TCP stream reassembly.
//!
//! The flow table turns a sequence of decoded TCP segments into one ordered
//! byte stream per connection direction, and spawns a dispatch task the
//! first time a flow is seen. Delivery uses an in-memory channel whose
//! receiving half is exposed to the handler as `AsyncRead`; closing the
//! sending half is how the handler observes end of stream.
//!
//! Ordering is by TCP sequence number with a reorder buffer for segments
//! that arrive early, and duplicate/overlap trimming for segments that
//! arrive late. This is deliberately modest: no SACK, no windows, no
//! keepalive probing. Flows idle past [`IDLE_AGE`] are flushed so abandoned
//! connections do not pin memory forever.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::dispatch;
use crate::filter::FilterConfig;
use crate::flow::FlowIdentity;

/// Flows idle longer than this are flushed.
pub const IDLE_AGE: Duration = Duration::from_secs(120);

/// How often the capture loop should ask for a flush.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// One decoded TCP segment, as handed over by the capture layer.
#[derive(Debug, Clone)]
pub struct Segment {
    pub flow: FlowIdentity,
    pub seq: u32,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub payload: Bytes,
}

/// Per-direction flow state: the channel into the handler task plus the
/// sequencing window.
#[derive(Debug)]
struct FlowState {
    tx: Option<UnboundedSender<io::Result<Bytes>>>,
    sequencer: Sequencer,
    last_seen: Instant,
}

impl FlowState {
    fn close(&mut self) {
        // dropping the sender is end-of-stream for the handler
        self.tx = None;
    }
}

/// Reorders segment payloads into a contiguous byte sequence.
#[derive(Debug, Default)]
struct Sequencer {
    next_seq: Option<u32>,
    pending: BTreeMap<u32, Bytes>,
}

impl Sequencer {
    /// Feeds one segment payload and returns the payloads that are now
    /// deliverable in order. Early segments are buffered, late or
    /// overlapping ones trimmed to their unseen suffix.
    fn push(&mut self, seq: u32, payload: Bytes) -> Vec<Bytes> {
        if payload.is_empty() {
            return Vec::new();
        }

        // first data segment on a flow without a SYN fixes the origin
        let mut next = *self.next_seq.get_or_insert(seq);
        self.pending.entry(seq).or_insert(payload);

        let mut ready = Vec::new();
        while let Some((&seq, _)) = self.pending.first_key_value() {
            let offset = seq.wrapping_sub(next);
            if (offset as i32) > 0 {
                // gap: wait for the missing segment
                break;
            }
            let payload = self.pending.pop_first().expect("checked non-empty").1;
            let skip = next.wrapping_sub(seq) as usize;
            if skip < payload.len() {
                let tail = payload.slice(skip..);
                next = next.wrapping_add(tail.len() as u32);
                ready.push(tail);
            }
            // otherwise the whole segment is a retransmission; drop it
        }
        self.next_seq = Some(next);
        ready
    }

    fn start_at(&mut self, seq: u32) {
        self.next_seq = Some(seq);
        self.pending.clear();
    }
}

/// Owns every live flow and the handler tasks feeding off them.
///
/// The table is driven synchronously by the capture loop; handler tasks run
/// on the supplied runtime handle. Dropping the table (via [`finish`])
/// closes all streams.
///
/// [`finish`]: FlowTable::finish
#[derive(Debug)]
pub struct FlowTable {
    flows: HashMap<FlowIdentity, FlowState>,
    config: Arc<FilterConfig>,
    shutdown: CancellationToken,
    runtime: Handle,
    handlers: Vec<JoinHandle<()>>,
}

impl FlowTable {
    pub fn new(config: Arc<FilterConfig>, shutdown: CancellationToken, runtime: Handle) -> Self {
        Self { flows: HashMap::new(), config, shutdown, runtime, handlers: Vec::new() }
    }

    /// Feeds one segment into its flow, creating the flow (and its handler
    /// task) on first sight.
    pub fn accept(&mut self, segment: Segment) {
        if !self.flows.contains_key(&segment.flow) {
            self.open_flow(segment.flow);
        }
        let state = self.flows.get_mut(&segment.flow).expect("flow opened above");
        state.last_seen = Instant::now();

        if segment.rst {
            debug!(flow = %segment.flow, "connection reset");
            state.close();
            return;
        }
        if segment.syn {
            state.sequencer.start_at(segment.seq.wrapping_add(1));
            return;
        }

        let mut receiver_gone = false;
        if let Some(tx) = &state.tx {
            for payload in state.sequencer.push(segment.seq, segment.payload) {
                trace!(flow = %segment.flow, len = payload.len(), "delivering bytes");
                if tx.send(Ok(payload)).is_err() {
                    // handler already gone; stop feeding this flow
                    receiver_gone = true;
                    break;
                }
            }
        }
        if receiver_gone {
            state.close();
        }

        if segment.fin {
            debug!(flow = %segment.flow, "connection finished");
            state.close();
        }
    }

    /// Closes and forgets flows that have been idle longer than `age`.
    pub fn flush_older_than(&mut self, age: Duration) {
        let now = Instant::now();
        let before = self.flows.len();
        self.flows.retain(|flow, state| {
            let keep = now.duration_since(state.last_seen) < age;
            if !keep {
                debug!(%flow, "flushing idle flow");
                state.close();
            }
            keep
        });
        let flushed = before - self.flows.len();
        if flushed > 0 {
            debug!(flushed, "idle flush complete");
        }
    }

    /// Closes every stream and hands back the handler tasks so the caller
    /// can await their completion.
    pub fn finish(self) -> Vec<JoinHandle<()>> {
        self.handlers
    }

    fn open_flow(&mut self, flow: FlowIdentity) {
        debug!(%flow, "new flow");
        let (tx, rx) = mpsc::unbounded_channel::<io::Result<Bytes>>();
        let reader = StreamReader::new(UnboundedReceiverStream::new(rx));

        let config = Arc::clone(&self.config);
        let shutdown = self.shutdown.child_token();
        self.handlers.push(self.runtime.spawn(dispatch::handle_stream(flow, reader, config, shutdown)));

        self.flows.insert(
            flow,
            FlowState { tx: Some(tx), sequencer: Sequencer::default(), last_seen: Instant::now() },
        );
    }
}
