use bytes::Bytes;

use crate::messages::ControlMessage;

/// One discrete message on the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// JSON-encoded control message.
    Text(String),
    /// Raw file chunk, no header.
    Binary(Bytes),
}

/// Decoded contents of a [`Frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Control(ControlMessage),
    Chunk(Bytes),
}

/// A text frame that did not decode into a known control message.
#[derive(Debug, thiserror::Error)]
#[error("malformed control frame ({len} bytes): {source}")]
pub struct MalformedFrame {
    pub len: usize,
    #[source]
    pub source: serde_json::Error,
}

impl Frame {
    /// Encodes a control message as a text frame.
    pub fn control(msg: &ControlMessage) -> Result<Self, serde_json::Error> {
        Ok(Frame::Text(msg.to_json()?))
    }

    /// Wraps a chunk in a binary frame.
    pub fn chunk(data: impl Into<Bytes>) -> Self {
        Frame::Binary(data.into())
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(s) => s.len(),
            Frame::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits the frame into its plane.
    pub fn decode(self) -> Result<Payload, MalformedFrame> {
        match self {
            Frame::Binary(b) => Ok(Payload::Chunk(b)),
            Frame::Text(text) => ControlMessage::from_json(&text)
                .map(Payload::Control)
                .map_err(|source| MalformedFrame {
                    len: text.len(),
                    source,
                }),
        }
    }
}
