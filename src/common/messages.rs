//! # Message Protocol
//!
//! Defines the payloads exchanged with peers over the relay:
//! - Plain text (or binary) frames, forwarded verbatim between populations
//! - Structured JSON envelopes for identification, device-origin wrapping and
//!   bitmap pushes
//! - Acknowledgments sent back to web peers after a forward attempt
//!
//! Anything a peer sends that is not a recognised envelope is treated as
//! opaque pass-through text. Parsing never fails.

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ============================================================================
// PAYLOADS - What actually travels over a connection
// ============================================================================

/// A single frame as received from, or sent to, a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Text view of the payload; binary frames are decoded lossily.
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Payload::Text(text) => std::borrow::Cow::Borrowed(text),
            Payload::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

// ============================================================================
// ENVELOPES - Structured JSON messages tagged by `type`
// ============================================================================

/// Structured envelopes, discriminated by their `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// **Identify** (peer -> relay)
    ///
    /// Sent by firmware right after the handshake to claim the device role.
    /// Consumed by the relay, never forwarded.
    Identify { client: String },

    /// **Device-origin wrap** (relay -> web)
    ///
    /// A message a device sent, tagged so dashboards can tell it apart from
    /// acknowledgments.
    Device { message: String },

    /// **Bitmap push** (relay -> devices)
    ///
    /// A converted sprite ready to be blitted onto the OLED.
    BitmapPush { data: BitmapFrame },
}

impl Envelope {
    /// Serialize to the JSON text sent over the wire.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Bitmap payload carried by [`Envelope::BitmapPush`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmapFrame {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Row-major, MSB-first, `height * width / 8` bytes
    pub bitmap_data: Vec<u8>,
}

// ============================================================================
// ACKNOWLEDGMENTS - Relay -> web sender after a forward attempt
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
}

/// `{status, message}` sent back to a web peer after its message was routed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: AckStatus,
    pub message: String,
}

impl Ack {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Error,
            message: message.into(),
        }
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// INBOUND CLASSIFICATION - Permissive parse of peer frames
// ============================================================================

/// What an inbound frame turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `{type: "identify", client}`
    Identify { client: String },
    /// Valid JSON that is not an identify envelope (forwarded verbatim)
    Structured,
    /// Anything else, including binary frames (forwarded verbatim)
    Text,
}

impl Inbound {
    /// Classify a frame. Never fails: unparseable input is plain text.
    pub fn parse(payload: &Payload) -> Self {
        let Payload::Text(text) = payload else {
            return Inbound::Text;
        };

        match serde_json::from_str::<Envelope>(text) {
            Ok(Envelope::Identify { client }) => Inbound::Identify { client },
            Ok(_) => Inbound::Structured,
            Err(_) if serde_json::from_str::<serde_json::Value>(text).is_ok() => {
                Inbound::Structured
            }
            Err(_) => Inbound::Text,
        }
    }
}
