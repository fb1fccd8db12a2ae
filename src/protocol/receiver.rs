//! Frame assembler for inbound messages.
//!
//! The transport interleaves independently sized text and binary frames with
//! no length prefixing beyond the header's own `num_buffers`, so assembly is a
//! state machine advanced one frame at a time:
//!
//! ```text
//! AwaitHeader -> AwaitMetadata -> AwaitContent
//!     -> (AwaitBufferHeader -> AwaitBufferPayload) * num_buffers -> complete
//! ```
//!
//! A frame of the wrong kind fails with a framing error and leaves the state
//! untouched; the caller decides whether to [`Receiver::reset`] or drop the
//! connection.

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};

use super::metrics::{MessageDirection, Metrics};
use super::{
    BufferHeader, Error, Frame, Header, MAX_BUFFER_SIZE, MAX_BUFFERS, Message, Result,
};

/// Receiver limits.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Largest `num_buffers` a header may declare.
    pub max_buffers: usize,
    /// Largest binary payload accepted.
    pub max_buffer_len: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            max_buffers: MAX_BUFFERS,
            max_buffer_len: MAX_BUFFER_SIZE,
        }
    }
}

/// Observable assembly position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    /// Waiting for a header fragment
    AwaitHeader,
    /// Waiting for a metadata fragment
    AwaitMetadata,
    /// Waiting for a content fragment
    AwaitContent,
    /// Waiting for a buffer header fragment
    AwaitBufferHeader,
    /// Waiting for a raw buffer payload
    AwaitBufferPayload,
}

impl AssemblyState {
    const fn expected(self) -> &'static str {
        match self {
            Self::AwaitHeader => "a header fragment",
            Self::AwaitMetadata => "a metadata fragment",
            Self::AwaitContent => "a content fragment",
            Self::AwaitBufferHeader => "a buffer header fragment",
            Self::AwaitBufferPayload => "a binary buffer payload",
        }
    }
}

#[derive(Debug, Default)]
enum State {
    #[default]
    AwaitHeader,
    AwaitMetadata {
        header: Header,
    },
    AwaitContent {
        header: Header,
        metadata: Value,
    },
    AwaitBufferHeader {
        message: Message,
    },
    AwaitBufferPayload {
        message: Message,
        buffer: BufferHeader,
    },
}

impl State {
    const fn position(&self) -> AssemblyState {
        match self {
            Self::AwaitHeader => AssemblyState::AwaitHeader,
            Self::AwaitMetadata { .. } => AssemblyState::AwaitMetadata,
            Self::AwaitContent { .. } => AssemblyState::AwaitContent,
            Self::AwaitBufferHeader { .. } => AssemblyState::AwaitBufferHeader,
            Self::AwaitBufferPayload { .. } => AssemblyState::AwaitBufferPayload,
        }
    }
}

/// Assembles one message at a time from a flat sequence of frames.
///
/// Owned by exactly one connection and fed in arrival order.
#[derive(Debug, Default)]
pub struct Receiver {
    state: State,
    config: ReceiverConfig,
    pending_bytes: usize,
}

impl Receiver {
    /// Create a receiver with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a receiver with custom limits.
    #[must_use]
    pub fn with_config(config: ReceiverConfig) -> Self {
        Self {
            state: State::AwaitHeader,
            config,
            pending_bytes: 0,
        }
    }

    /// Current assembly position.
    #[must_use]
    pub const fn state(&self) -> AssemblyState {
        self.state.position()
    }

    /// Discard any partially assembled message.
    pub fn reset(&mut self) {
        self.state = State::AwaitHeader;
        self.pending_bytes = 0;
    }

    /// Advance by exactly one frame.
    ///
    /// Returns the message once its last frame has been consumed, `None`
    /// while assembly is still in progress.
    #[instrument(level = "trace", skip_all, fields(state = ?self.state()))]
    pub fn consume(&mut self, frame: impl Into<Frame>) -> Result<Option<Message>> {
        let frame = frame.into();
        let len = frame.len();
        self.pending_bytes += len;

        // Handlers take ownership of the state; on a decode error it is left
        // at AwaitHeader so the next message can still assemble.
        match (std::mem::take(&mut self.state), frame) {
            (State::AwaitHeader, Frame::Text(text)) => self.on_header(&text),
            (State::AwaitMetadata { header }, Frame::Text(text)) => {
                self.on_metadata(header, &text)
            }
            (State::AwaitContent { header, metadata }, Frame::Text(text)) => {
                self.on_content(header, metadata, &text)
            }
            (State::AwaitBufferHeader { message }, Frame::Text(text)) => {
                self.on_buffer_header(message, &text)
            }
            (State::AwaitBufferPayload { message, buffer }, Frame::Binary(payload)) => {
                if payload.len() > self.config.max_buffer_len {
                    self.state = State::AwaitBufferPayload { message, buffer };
                    self.pending_bytes -= len;
                    Metrics::record_framing_error();
                    return Err(Error::BufferTooLarge {
                        size: payload.len(),
                        max: self.config.max_buffer_len,
                    });
                }
                self.on_buffer_payload(message, buffer, payload)
            }
            (state, frame) => {
                let expected = state.position().expected();
                self.state = state;
                self.pending_bytes -= len;
                Metrics::record_framing_error();
                Err(Error::UnexpectedFrame {
                    expected,
                    found: frame.kind(),
                })
            }
        }
    }

    fn on_header(&mut self, text: &str) -> Result<Option<Message>> {
        self.pending_bytes = text.len();
        let header = match serde_json::from_str::<Option<Header>>(text) {
            Ok(Some(header)) => header,
            Ok(None) => {
                warn!("null header fragment, waiting for a new header");
                Metrics::record_discarded_header();
                self.reset();
                return Ok(None);
            }
            Err(err) => {
                warn!(error = %err, "invalid header fragment, waiting for a new header");
                Metrics::record_discarded_header();
                self.reset();
                return Ok(None);
            }
        };

        let declared = header.num_buffers();
        if declared > self.config.max_buffers {
            Metrics::record_framing_error();
            return Err(Error::TooManyBuffers {
                expected: self.config.max_buffers,
            });
        }

        trace!(msgid = header.msgid.as_deref(), num_buffers = declared, "header received");
        self.state = State::AwaitMetadata { header };
        Ok(None)
    }

    fn on_metadata(&mut self, header: Header, text: &str) -> Result<Option<Message>> {
        let Some(metadata) = parse_fragment("metadata", text)? else {
            return Ok(None);
        };
        trace!("metadata received");
        self.state = State::AwaitContent { header, metadata };
        Ok(None)
    }

    fn on_content(&mut self, header: Header, metadata: Value, text: &str) -> Result<Option<Message>> {
        let Some(content) = parse_fragment("content", text)? else {
            return Ok(None);
        };
        let message = Message::from_parts(header, metadata, content);
        if message.num_buffers() == 0 {
            return Ok(Some(self.finish(message)));
        }
        trace!(num_buffers = message.num_buffers(), "content received, awaiting buffers");
        self.state = State::AwaitBufferHeader { message };
        Ok(None)
    }

    fn on_buffer_header(&mut self, message: Message, text: &str) -> Result<Option<Message>> {
        let buffer: BufferHeader = serde_json::from_str(text)
            .map_err(|source| Error::Decode { part: "buffer header", source })?;
        trace!(id = %buffer.id, "buffer header received");
        self.state = State::AwaitBufferPayload { message, buffer };
        Ok(None)
    }

    fn on_buffer_payload(
        &mut self,
        mut message: Message,
        buffer: BufferHeader,
        payload: Bytes,
    ) -> Result<Option<Message>> {
        trace!(id = %buffer.id, len = payload.len(), "buffer payload received");
        message.assemble_buffer(buffer, payload)?;
        if message.complete() {
            return Ok(Some(self.finish(message)));
        }
        self.state = State::AwaitBufferHeader { message };
        Ok(None)
    }

    fn finish(&mut self, message: Message) -> Message {
        Metrics::record_message(MessageDirection::Received, message.msgtype(), self.pending_bytes);
        debug!(
            msgid = message.msgid(),
            msgtype = message.msgtype(),
            buffers = message.buffers().len(),
            "message assembled"
        );
        self.reset();
        message
    }
}

/// Parse a metadata/content fragment; `null` discards the message.
fn parse_fragment(part: &'static str, text: &str) -> Result<Option<Value>> {
    let value: Value =
        serde_json::from_str(text).map_err(|source| Error::Decode { part, source })?;
    if value.is_null() {
        warn!(part, "null fragment, discarding message");
        return Ok(None);
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(len: usize) -> Frame {
        Frame::Binary(Bytes::from(vec![7u8; len]))
    }

    #[test]
    fn test_multipart_scenario() {
        let mut receiver = Receiver::new();

        assert!(receiver
            .consume(r#"{"msgtype":"FOO","msgid":"10","num_buffers":1}"#)
            .unwrap()
            .is_none());
        assert!(receiver.consume("{}").unwrap().is_none());
        assert!(receiver.consume(r#"{"bar":"20"}"#).unwrap().is_none());
        assert!(receiver.consume(r#"{"id":"1"}"#).unwrap().is_none());

        let message = receiver.consume(buffer(10)).unwrap().expect("complete message");
        assert!(message.complete());
        assert_eq!(message.msgtype(), Some("FOO"));
        assert_eq!(message.msgid(), Some("10"));
        assert_eq!(message.buffers().len(), 1);
        assert_eq!(message.buffers()[0].0.id, "1");
        assert_eq!(message.buffers()[0].1.len(), 10);
        assert_eq!(receiver.state(), AssemblyState::AwaitHeader);
    }

    #[test]
    fn test_message_without_buffers() {
        let mut receiver = Receiver::new();
        receiver.consume(r#"{"msgtype":"ACK","msgid":"1"}"#).unwrap();
        receiver.consume("{}").unwrap();
        let message = receiver.consume("{}").unwrap().expect("complete message");
        assert!(message.buffers().is_empty());
        assert_eq!(receiver.state(), AssemblyState::AwaitHeader);
    }

    #[test]
    fn test_binary_rejected_before_payload() {
        for steps in 0..4 {
            let mut receiver = Receiver::new();
            let frames = [
                r#"{"msgtype":"FOO","msgid":"10","num_buffers":1}"#,
                "{}",
                "{}",
                r#"{"id":"1"}"#,
            ];
            for text in &frames[..steps] {
                receiver.consume(*text).unwrap();
            }
            let before = receiver.state();
            let err = receiver.consume(buffer(4)).unwrap_err();
            assert!(matches!(err, Error::UnexpectedFrame { .. }), "step {steps}");
            assert!(err.is_framing());
            assert_eq!(receiver.state(), before);
        }
    }

    #[test]
    fn test_text_rejected_for_payload() {
        let mut receiver = Receiver::new();
        receiver
            .consume(r#"{"msgtype":"FOO","msgid":"10","num_buffers":1}"#)
            .unwrap();
        receiver.consume("{}").unwrap();
        receiver.consume("{}").unwrap();
        receiver.consume(r#"{"id":"1"}"#).unwrap();

        let err = receiver.consume("{}").unwrap_err();
        assert!(matches!(err, Error::UnexpectedFrame { .. }));
        assert_eq!(receiver.state(), AssemblyState::AwaitBufferPayload);

        // the in-progress message is still intact
        let message = receiver.consume(buffer(3)).unwrap().expect("complete message");
        assert_eq!(message.buffers().len(), 1);
    }

    #[test]
    fn test_null_header_is_discarded() {
        let mut receiver = Receiver::new();
        assert!(receiver.consume("null").unwrap().is_none());
        assert_eq!(receiver.state(), AssemblyState::AwaitHeader);
        assert!(receiver.consume("not json").unwrap().is_none());
        assert_eq!(receiver.state(), AssemblyState::AwaitHeader);
    }

    #[test]
    fn test_invalid_content_resets() {
        let mut receiver = Receiver::new();
        receiver.consume(r#"{"msgtype":"ACK","msgid":"1"}"#).unwrap();
        receiver.consume("{}").unwrap();
        let err = receiver.consume("{oops").unwrap_err();
        assert!(matches!(err, Error::Decode { part: "content", .. }));
        assert!(!err.is_framing());
        assert_eq!(receiver.state(), AssemblyState::AwaitHeader);

        receiver.consume(r#"{"msgtype":"ACK","msgid":"2"}"#).unwrap();
        receiver.consume("{}").unwrap();
        let message = receiver.consume("{}").unwrap().expect("next message assembles");
        assert_eq!(message.msgid(), Some("2"));
    }

    #[test]
    fn test_declared_buffer_limit() {
        let mut receiver = Receiver::with_config(ReceiverConfig {
            max_buffers: 2,
            ..ReceiverConfig::default()
        });
        let err = receiver
            .consume(r#"{"msgtype":"FOO","msgid":"1","num_buffers":3}"#)
            .unwrap_err();
        assert!(matches!(err, Error::TooManyBuffers { expected: 2 }));
        assert_eq!(receiver.state(), AssemblyState::AwaitHeader);
    }

    #[test]
    fn test_buffer_length_limit() {
        let mut receiver = Receiver::with_config(ReceiverConfig {
            max_buffer_len: 4,
            ..ReceiverConfig::default()
        });
        receiver
            .consume(r#"{"msgtype":"FOO","msgid":"1","num_buffers":1}"#)
            .unwrap();
        receiver.consume("{}").unwrap();
        receiver.consume("{}").unwrap();
        receiver.consume(r#"{"id":"a"}"#).unwrap();
        let err = receiver.consume(buffer(5)).unwrap_err();
        assert!(matches!(err, Error::BufferTooLarge { size: 5, max: 4 }));
        assert_eq!(receiver.state(), AssemblyState::AwaitBufferPayload);
    }

    #[test]
    fn test_reset_discards_partial() {
        let mut receiver = Receiver::new();
        receiver.consume(r#"{"msgtype":"ACK","msgid":"1"}"#).unwrap();
        receiver.reset();
        assert_eq!(receiver.state(), AssemblyState::AwaitHeader);
    }
}
