//! Protocol message: header, metadata, content and ordered buffers
//!
//! # Wire Format
//!
//! ```text
//! [TEXT header] [TEXT metadata] [TEXT content] ([TEXT buffer header] [BINARY payload]) * num_buffers
//! ```

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, instrument};

use super::metrics::{MessageDirection, Metrics};
use super::{BufferHeader, Error, Header, MessageType, Result};
use crate::transport::FrameSink;

/// One attached buffer: its header and raw bytes
pub type BufferRef = (BufferHeader, Bytes);

/// A logical protocol message, possibly still being assembled
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    header: Option<Header>,
    metadata: Option<Value>,
    content: Option<Value>,
    buffers: Vec<BufferRef>,
}

impl Message {
    /// Create a complete message with a fresh msgid and no buffers
    #[must_use]
    pub fn create(msgtype: MessageType, content: Value, metadata: Value) -> Self {
        Self::from_parts(Self::create_header(msgtype, None), metadata, content)
    }

    /// Create a reply correlated to the request with id `reqid`
    #[must_use]
    pub fn reply(msgtype: MessageType, reqid: impl Into<String>, content: Value) -> Self {
        let header = Self::create_header(msgtype, Some(reqid.into()));
        Self::from_parts(header, Value::Object(serde_json::Map::new()), content)
    }

    /// Return a header with a fresh msgid
    #[must_use]
    pub fn create_header(msgtype: MessageType, reqid: Option<String>) -> Header {
        Header::new(msgtype, reqid)
    }

    /// Build a message from already-parsed fragments
    #[must_use]
    pub fn from_parts(header: Header, metadata: Value, content: Value) -> Self {
        Self {
            header: Some(header),
            metadata: non_null(metadata),
            content: non_null(content),
            buffers: Vec::new(),
        }
    }

    /// Parse three JSON fragments into a possibly incomplete message.
    ///
    /// Any fragment may be the literal `null`, which leaves that part unset.
    pub fn assemble(header_json: &str, metadata_json: &str, content_json: &str) -> Result<Self> {
        let header: Option<Header> = serde_json::from_str(header_json)
            .map_err(|source| Error::Decode { part: "header", source })?;
        let metadata = parse_fragment("metadata", metadata_json)?;
        let content = parse_fragment("content", content_json)?;

        Ok(Self {
            header,
            metadata,
            content,
            buffers: Vec::new(),
        })
    }

    /// Attach a buffer read off the wire, validating against `num_buffers`
    pub fn assemble_buffer(&mut self, header: BufferHeader, payload: Bytes) -> Result<()> {
        let expected = self.num_buffers();
        if self.buffers.len() >= expected {
            return Err(Error::TooManyBuffers { expected });
        }
        self.buffers.push((header, payload));
        Ok(())
    }

    /// Attach an outbound buffer, growing `num_buffers` to match
    pub fn add_buffer(&mut self, header: BufferHeader, payload: Bytes) {
        let header_fragment = self.header.get_or_insert_with(Header::default);
        header_fragment.num_buffers = Some(header_fragment.num_buffers() + 1);
        self.buffers.push((header, payload));
    }

    /// Whether header, metadata and content are present and every declared
    /// buffer is attached
    #[must_use]
    pub fn complete(&self) -> bool {
        self.header.is_some()
            && self.metadata.is_some()
            && self.content.is_some()
            && self.num_buffers() == self.buffers.len()
    }

    /// Report a missing routing field without failing
    #[must_use]
    pub fn problem(&self) -> Option<&'static str> {
        let header = self.header.as_ref();
        if header.and_then(|h| h.msgtype.as_ref()).is_none() {
            return Some("No msgtype in header");
        }
        if header.and_then(|h| h.msgid.as_ref()).is_none() {
            return Some("No msgid in header");
        }
        None
    }

    /// Write header, metadata, content, then each buffer header and payload.
    ///
    /// Returns the number of bytes written.
    #[instrument(level = "trace", skip_all, fields(msgtype = self.msgtype().unwrap_or("")))]
    pub fn send<S: FrameSink + ?Sized>(&self, sink: &mut S) -> Result<usize> {
        if !self.complete() {
            return Err(Error::IncompleteMessage);
        }

        let mut sent = 0;
        for fragment in [self.header_json()?, self.metadata_json()?, self.content_json()?] {
            sink.send_text(&fragment)?;
            sent += fragment.len();
        }

        for (header, payload) in &self.buffers {
            let header_json = serde_json::to_string(header)?;
            sink.send_text(&header_json)?;
            sink.send_binary(payload)?;
            sent += header_json.len() + payload.len();
        }

        Metrics::record_message(MessageDirection::Sent, self.msgtype(), sent);
        debug!(msgid = self.msgid(), buffers = self.buffers.len(), sent, "message sent");
        Ok(sent)
    }

    /// Declared buffer count (`0` when absent)
    #[must_use]
    pub fn num_buffers(&self) -> usize {
        self.header.as_ref().map_or(0, Header::num_buffers)
    }

    /// Get message ID
    #[must_use]
    pub fn msgid(&self) -> Option<&str> {
        self.header.as_ref()?.msgid.as_deref()
    }

    /// Get message type name
    #[must_use]
    pub fn msgtype(&self) -> Option<&str> {
        self.header.as_ref()?.msgtype.as_deref()
    }

    /// Get request ID this message replies to
    #[must_use]
    pub fn reqid(&self) -> Option<&str> {
        self.header.as_ref()?.reqid.as_deref()
    }

    /// Get message type, if it is a known one
    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        self.msgtype()?.parse().ok()
    }

    /// Get header
    #[must_use]
    pub const fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Get metadata
    #[must_use]
    pub const fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// Get content
    #[must_use]
    pub const fn content(&self) -> Option<&Value> {
        self.content.as_ref()
    }

    /// Attached buffers in arrival order
    #[must_use]
    pub fn buffers(&self) -> &[BufferRef] {
        &self.buffers
    }

    /// Look up an attached buffer by id
    #[must_use]
    pub fn buffer(&self, id: &str) -> Option<&Bytes> {
        self.buffers
            .iter()
            .find(|(header, _)| header.id == id)
            .map(|(_, payload)| payload)
    }

    /// Serialized header fragment
    pub fn header_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.header)?)
    }

    /// Serialized metadata fragment
    pub fn metadata_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.metadata)?)
    }

    /// Serialized content fragment
    pub fn content_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.content)?)
    }
}

fn parse_fragment(part: &'static str, json: &str) -> Result<Option<Value>> {
    let value: Value = serde_json::from_str(json).map_err(|source| Error::Decode { part, source })?;
    Ok(non_null(value))
}

fn non_null(value: Value) -> Option<Value> {
    if value.is_null() { None } else { Some(value) }
}
