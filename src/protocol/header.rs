//! Message and buffer headers
//!
//! # Wire Format
//!
//! ```text
//! {"msgid": "<uuid>", "msgtype": "PATCH-DOC", "reqid": "<uuid>", "num_buffers": 2}
//! ```
//!
//! `msgid` and `msgtype` are required for routing but may be absent from a
//! parsed header; [`super::Message::problem`] reports that without failing.
//! `reqid` and `num_buffers` are optional.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MessageType;

/// Message header fragment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Unique message id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msgid: Option<String>,
    /// Message type name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msgtype: Option<String>,
    /// Id of the request this message replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reqid: Option<String>,
    /// Number of buffer pairs following the content fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_buffers: Option<usize>,
}

impl Header {
    /// Create a header with a fresh msgid
    #[must_use]
    pub fn new(msgtype: MessageType, reqid: Option<String>) -> Self {
        Self {
            msgid: Some(generate_id()),
            msgtype: Some(msgtype.as_str().to_owned()),
            reqid,
            num_buffers: None,
        }
    }

    /// Declared buffer count (`0` when absent)
    #[must_use]
    pub fn num_buffers(&self) -> usize {
        self.num_buffers.unwrap_or(0)
    }
}

/// Header fragment preceding each raw buffer payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferHeader {
    /// Buffer id referenced from content as `{"__buffer__": id}`
    pub id: String,
}

impl BufferHeader {
    /// Create a buffer header
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Create a buffer header with a fresh id
    #[must_use]
    pub fn generate() -> Self {
        Self { id: generate_id() }
    }
}

/// Generate a random message/buffer id
pub(crate) fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_omits_absent_fields() {
        let header = Header {
            msgid: Some("10".into()),
            msgtype: Some("FOO".into()),
            ..Header::default()
        };
        let json = serde_json::to_string(&header).unwrap();
        assert_eq!(json, r#"{"msgid":"10","msgtype":"FOO"}"#);
    }

    #[test]
    fn test_header_parses_optional_fields() {
        let header: Header =
            serde_json::from_str(r#"{"msgtype":"FOO","msgid":"10","num_buffers":1}"#).unwrap();
        assert_eq!(header.msgid.as_deref(), Some("10"));
        assert_eq!(header.msgtype.as_deref(), Some("FOO"));
        assert_eq!(header.reqid, None);
        assert_eq!(header.num_buffers(), 1);
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = Header::new(MessageType::Ack, None);
        let b = Header::new(MessageType::Ack, None);
        assert_ne!(a.msgid, b.msgid);
        assert_eq!(a.msgtype.as_deref(), Some("ACK"));
    }
}
