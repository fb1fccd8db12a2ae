//! Frame sink seam between messages and the duplex transport.
//!
//! The transport itself (websocket or otherwise) lives outside this crate; it
//! only has to accept text and binary frames in the order they are written.

use bytes::Bytes;

use crate::protocol::{Frame, Result};

/// Outbound half of a duplex frame transport.
pub trait FrameSink {
    /// Write one text frame.
    fn send_text(&mut self, text: &str) -> Result<()>;

    /// Write one binary frame.
    fn send_binary(&mut self, payload: &Bytes) -> Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn send_text(&mut self, text: &str) -> Result<()> {
        (**self).send_text(text)
    }

    fn send_binary(&mut self, payload: &Bytes) -> Result<()> {
        (**self).send_binary(payload)
    }
}

/// Recording sink, useful for loopback and tests.
impl FrameSink for Vec<Frame> {
    fn send_text(&mut self, text: &str) -> Result<()> {
        self.push(Frame::Text(text.to_owned()));
        Ok(())
    }

    fn send_binary(&mut self, payload: &Bytes) -> Result<()> {
        self.push(Frame::Binary(payload.clone()));
        Ok(())
    }
}
