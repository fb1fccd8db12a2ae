use std::sync::atomic::{AtomicU64, Ordering};

use super::MessageType;

/// Track protocol metrics without external dependencies.
pub(crate) struct Metrics;

static SENT_MESSAGES: AtomicU64 = AtomicU64::new(0);
static RECEIVED_MESSAGES: AtomicU64 = AtomicU64::new(0);
static SENT_BYTES: AtomicU64 = AtomicU64::new(0);
static RECEIVED_BYTES: AtomicU64 = AtomicU64::new(0);
static FRAMING_ERRORS: AtomicU64 = AtomicU64::new(0);
static DISCARDED_HEADERS: AtomicU64 = AtomicU64::new(0);

const KNOWN_TYPES: usize = MessageType::ALL.len();

struct MessageTypeCounters {
    known: [AtomicU64; KNOWN_TYPES],
    other: AtomicU64,
}

static MESSAGE_COUNTERS: MessageTypeCounters = MessageTypeCounters::new();

impl MessageTypeCounters {
    const fn new() -> Self {
        Self {
            known: [const { AtomicU64::new(0) }; KNOWN_TYPES],
            other: AtomicU64::new(0),
        }
    }

    fn increment(&self, msgtype: Option<&str>) {
        match msgtype.and_then(|name| name.parse::<MessageType>().ok()) {
            Some(ty) => self.known[ty.index()].fetch_add(1, Ordering::Relaxed),
            None => self.other.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn load_all(&self) -> [u64; KNOWN_TYPES] {
        std::array::from_fn(|i| self.known[i].load(Ordering::Relaxed))
    }
}

/// Direction of message flow for counting.
#[derive(Clone, Copy)]
pub(crate) enum MessageDirection {
    Sent,
    Received,
}

impl Metrics {
    #[inline]
    pub(crate) fn record_message(direction: MessageDirection, msgtype: Option<&str>, bytes: usize) {
        let bytes = u64::try_from(bytes).unwrap_or(u64::MAX);
        match direction {
            MessageDirection::Sent => {
                SENT_MESSAGES.fetch_add(1, Ordering::Relaxed);
                SENT_BYTES.fetch_add(bytes, Ordering::Relaxed);
            }
            MessageDirection::Received => {
                RECEIVED_MESSAGES.fetch_add(1, Ordering::Relaxed);
                RECEIVED_BYTES.fetch_add(bytes, Ordering::Relaxed);
            }
        }
        MESSAGE_COUNTERS.increment(msgtype);
    }

    #[inline]
    pub(crate) fn record_framing_error() {
        FRAMING_ERRORS.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_discarded_header() {
        DISCARDED_HEADERS.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn totals() -> MetricsSnapshot {
        MetricsSnapshot {
            sent_messages: SENT_MESSAGES.load(Ordering::Relaxed),
            received_messages: RECEIVED_MESSAGES.load(Ordering::Relaxed),
            sent_bytes: SENT_BYTES.load(Ordering::Relaxed),
            received_bytes: RECEIVED_BYTES.load(Ordering::Relaxed),
            framing_errors: FRAMING_ERRORS.load(Ordering::Relaxed),
            discarded_headers: DISCARDED_HEADERS.load(Ordering::Relaxed),
            per_type: MESSAGE_COUNTERS.load_all(),
            other_messages: MESSAGE_COUNTERS.other.load(Ordering::Relaxed),
        }
    }
}

/// Lightweight snapshot of process-wide protocol counters.
#[derive(Default, Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    /// Messages written with [`super::Message::send`]
    pub sent_messages: u64,
    /// Messages completed by a [`super::Receiver`]
    pub received_messages: u64,
    /// Bytes written across all frames
    pub sent_bytes: u64,
    /// Bytes consumed across all completed messages
    pub received_bytes: u64,
    /// Frames rejected for arriving in the wrong state
    pub framing_errors: u64,
    /// Header frames discarded as null or unparsable
    pub discarded_headers: u64,
    /// Messages whose msgtype is not a known type
    pub other_messages: u64,
    per_type: [u64; KNOWN_TYPES],
}

impl MetricsSnapshot {
    /// Messages of type `ty` seen in either direction
    #[must_use]
    pub const fn count(&self, ty: MessageType) -> u64 {
        self.per_type[ty.index()]
    }
}

/// Snapshot the process-wide protocol counters.
#[must_use]
pub fn metrics_snapshot() -> MetricsSnapshot {
    Metrics::totals()
}
