//! Wire protocol shared by clients and the relay server.
//!
//! Messages are JSON text frames tagged by `"type"`:
//! ```json
//! { "type": "stroke-created", "id": "s1", "points": [0, 0, 1, 1], "color": "#000", "width": 4 }
//! { "type": "stroke-undo", "strokeId": "s1" }
//! { "type": "cursor", "x": 10, "y": 20 }
//! { "type": "chat-message", "message": "hello" }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stroke::Stroke;

/// Errors raised while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

impl ProtocolError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidField { field, reason }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Messages sent by a client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// A finished stroke.
    StrokeCreated(Stroke),
    /// Retract one of the sender's strokes.
    #[serde(rename_all = "camelCase")]
    StrokeUndo { stroke_id: String },
    /// Re-apply a previously retracted stroke.
    StrokeRedo(Stroke),
    /// Pointer position of the sender.
    Cursor { x: f64, y: f64 },
    /// Chat text; the relay assigns id, author and timestamp.
    ChatMessage { message: String },
}

impl ClientMessage {
    /// Decode and validate a text frame.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        let msg: Self = serde_json::from_str(text)?;
        msg.validate()?;
        Ok(msg)
    }

    /// Check the field set of this message.
    pub fn validate(&self) -> ProtocolResult<()> {
        match self {
            Self::StrokeCreated(stroke) | Self::StrokeRedo(stroke) => stroke.validate(),
            Self::StrokeUndo { stroke_id } => {
                if stroke_id.is_empty() {
                    return Err(ProtocolError::invalid("strokeId", "must not be empty"));
                }
                Ok(())
            }
            Self::Cursor { x, y } => {
                if !x.is_finite() || !y.is_finite() {
                    return Err(ProtocolError::invalid("x/y", "must be finite"));
                }
                Ok(())
            }
            Self::ChatMessage { message } => {
                if message.trim().is_empty() {
                    return Err(ProtocolError::invalid("message", "must not be blank"));
                }
                Ok(())
            }
        }
    }

    /// Event name as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StrokeCreated(_) => "stroke-created",
            Self::StrokeUndo { .. } => "stroke-undo",
            Self::StrokeRedo(_) => "stroke-redo",
            Self::Cursor { .. } => "cursor",
            Self::ChatMessage { .. } => "chat-message",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Messages delivered by the relay to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    StrokeCreated(Stroke),
    #[serde(rename_all = "camelCase")]
    StrokeUndo { stroke_id: String },
    StrokeRedo(Stroke),
    Cursor(CursorUpdate),
    ChatMessage(ChatMessage),
    /// A participant's connection went away.
    ParticipantLeft { id: String },
}

impl ServerMessage {
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Cursor position augmented with the origin connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorUpdate {
    /// Connection identifier of the participant.
    pub id: String,
    pub username: String,
    pub x: f64,
    pub y: f64,
}

/// A chat message as stamped by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub username: String,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}
