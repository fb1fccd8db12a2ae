//! docwire error types

use thiserror::Error;

use super::frame::FrameKind;

/// Errors raised while framing, decoding, or applying document changes
#[derive(Error, Debug)]
pub enum Error {
    /// A frame of the wrong kind arrived for the current assembly state
    #[error("expected {expected} but received a {found} frame")]
    UnexpectedFrame {
        /// What the receiver was waiting for
        expected: &'static str,
        /// Kind of the offending frame
        found: FrameKind,
    },

    /// More buffers attached than the header declared (or than allowed)
    #[error("too many buffers received, expecting {expected}")]
    TooManyBuffers {
        /// Number of buffers the message may carry
        expected: usize,
    },

    /// Binary payload exceeds the configured maximum
    #[error("buffer too large: {size} bytes (max {max})")]
    BufferTooLarge {
        /// Payload size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// One of the JSON fragments of a message could not be parsed
    #[error("{part} could not be decoded: {source}")]
    Decode {
        /// Which fragment failed (header, metadata, content, buffer header)
        part: &'static str,
        /// Underlying parse error
        source: serde_json::Error,
    },

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inline array payload was not valid base64
    #[error("invalid base64 array payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Column storage has no grow/shift/patch strategy for this data
    #[error("unsupported column data: {0}")]
    UnsupportedData(String),

    /// Attempt to encode a change to the identity attribute
    #[error("cannot change the identity attribute {attr:?}")]
    IdentityMutation {
        /// Attribute name
        attr: String,
    },

    /// Index outside of the addressed axis
    #[error("index {index} out of bounds for axis of length {len}")]
    IndexOutOfBounds {
        /// Requested index (before normalization)
        index: i64,
        /// Axis length
        len: usize,
    },

    /// Slice with a zero step
    #[error("slice step cannot be zero")]
    ZeroStep,

    /// Patch addresses a different number of cells than it supplies values for
    #[error("patch addresses {expected} cells but supplies {got} values")]
    ValueCountMismatch {
        /// Number of addressed cells
        expected: usize,
        /// Number of values supplied
        got: usize,
    },

    /// Structurally invalid patch entry
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// Structurally invalid change event
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// `__buffer__` reference with no matching attached buffer
    #[error("no buffer with id {0:?} attached to message")]
    MissingBuffer(String),

    /// Event targets a model the document does not know
    #[error("unknown model {0:?}")]
    UnknownModel(String),

    /// Model definition names a type that was never registered
    #[error("unknown model type {0:?}")]
    UnknownModelType(String),

    /// Attribute not declared by the model's property table
    #[error("model type {model_type:?} has no property {attr:?}")]
    UnknownProperty {
        /// Model type name
        model_type: String,
        /// Attribute name
        attr: String,
    },

    /// Patch targets a column the source does not have
    #[error("unknown column {0:?}")]
    UnknownColumn(String),

    /// Operation needs a complete message
    #[error("message is incomplete")]
    IncompleteMessage,

    /// IO error while writing frames
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error leaves frame assembly in an ambiguous state.
    ///
    /// Callers should drop the partially assembled message (or the
    /// connection) when this returns `true`.
    #[must_use]
    pub const fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedFrame { .. } | Self::TooManyBuffers { .. } | Self::BufferTooLarge { .. }
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
