//! docwire - Document synchronization protocol for interactive plotting sessions
//!
//! This library keeps a document (a graph of typed models plus columnar data
//! sources) consistent between a host process and remote display clients over
//! a duplex text/binary frame transport.
//!
//! # Quick Start
//!
//! ```rust
//! use docwire::{Frame, Message, MessageType, Receiver};
//! use serde_json::json;
//!
//! // Create a message and write its frames
//! let msg = Message::create(MessageType::PullDocReq, json!({}), json!({}));
//! let mut frames: Vec<Frame> = Vec::new();
//! msg.send(&mut frames)?;
//!
//! // Reassemble on the other side
//! let mut receiver = Receiver::new();
//! let mut received = None;
//! for frame in frames {
//!     received = receiver.consume(frame)?;
//! }
//! assert_eq!(received.unwrap().msgtype(), Some("PULL-DOC-REQ"));
//! # Ok::<(), docwire::Error>(())
//! ```
//!
//! # Features
//!
//! - **Multi-part framing** - header, metadata and content JSON followed by
//!   binary buffer pairs, reassembled by a frame-at-a-time state machine
//! - **Change events** - attribute changes, column streams and patches, root
//!   and title changes, with reference discovery
//! - **Column patch engine** - append with rollover and sparse index, slice or
//!   multi-dimensional overwrites over typed numeric buffers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod columns;
pub mod document;
pub mod protocol;
pub mod transport;

pub use columns::{Column, ColumnTable, Patch};
pub use document::{Document, DocumentEvent, EncodeOptions};
pub use protocol::{
    Error, Frame, MAX_BUFFER_SIZE, MAX_BUFFERS, Message, MessageType, Receiver, Result,
};
pub use transport::FrameSink;

/// Protocol version
pub const VERSION: &str = "1.0.0";
