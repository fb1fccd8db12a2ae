//! Protocol core: frames, messages and the inbound frame assembler
//!
//! A message travels as a header, metadata and content JSON fragment followed
//! by `num_buffers` pairs of buffer-header fragment and raw binary payload.

mod error;
mod frame;
mod header;
mod message;
pub(crate) mod metrics;
mod receiver;
mod types;

pub use error::{Error, Result};
pub use frame::{Frame, FrameKind};
pub use header::{BufferHeader, Header};
pub(crate) use header::generate_id;
pub use message::{BufferRef, Message};
pub use metrics::{MetricsSnapshot, metrics_snapshot};
pub use receiver::{AssemblyState, Receiver, ReceiverConfig};
pub use types::{MessageType, UnknownMessageType};

/// Default limit on buffers a single message may declare
pub const MAX_BUFFERS: usize = 1024;

/// Default limit on a single buffer payload (256 MB)
pub const MAX_BUFFER_SIZE: usize = 256 * 1024 * 1024;
