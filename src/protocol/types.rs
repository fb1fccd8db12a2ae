//! Message types carried in the header `msgtype` field

use std::fmt;
use std::str::FromStr;

/// Known protocol message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Connection acknowledgment
    Ack,
    /// Generic success reply
    Ok,
    /// Error reply
    Error,

    /// Incremental document changes
    PatchDoc,
    /// Request for a full document snapshot
    PullDocReq,
    /// Full document snapshot reply
    PullDocReply,
    /// Push a full document to the peer
    PushDoc,

    /// Request server version information
    ServerInfoReq,
    /// Server version information reply
    ServerInfoReply,
}

impl MessageType {
    /// All known message types
    pub const ALL: [Self; 9] = [
        Self::Ack,
        Self::Ok,
        Self::Error,
        Self::PatchDoc,
        Self::PullDocReq,
        Self::PullDocReply,
        Self::PushDoc,
        Self::ServerInfoReq,
        Self::ServerInfoReply,
    ];

    /// Wire name used in the header
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ack => "ACK",
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::PatchDoc => "PATCH-DOC",
            Self::PullDocReq => "PULL-DOC-REQ",
            Self::PullDocReply => "PULL-DOC-REPLY",
            Self::PushDoc => "PUSH-DOC",
            Self::ServerInfoReq => "SERVER-INFO-REQ",
            Self::ServerInfoReply => "SERVER-INFO-REPLY",
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for MessageType {
    type Err = UnknownMessageType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| UnknownMessageType(s.to_owned()))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header msgtype that does not name a known message type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown message type {0:?}")]
pub struct UnknownMessageType(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_names_roundtrip() {
        for ty in MessageType::ALL {
            assert_eq!(ty.as_str().parse::<MessageType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_unknown_message_type() {
        let err = "FOO".parse::<MessageType>().unwrap_err();
        assert_eq!(err, UnknownMessageType("FOO".to_owned()));
    }
}
