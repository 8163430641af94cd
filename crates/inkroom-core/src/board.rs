//! Replicated board state held by each participant.

use std::collections::HashMap;

use crate::protocol::{ChatMessage, CursorUpdate, ServerMessage};
use crate::stroke::Stroke;

/// Palette remote cursors are drawn from.
const CURSOR_PALETTE: [&str; 10] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#FFA07A", "#98D8C8", "#F7DC6F", "#BB8FCE", "#85C1E2",
    "#F8B739", "#52C41A",
];

/// Deterministic cursor colour for a connection id.
pub fn cursor_color(id: &str) -> &'static str {
    let hash = id
        .encode_utf16()
        .fold(0i32, |hash, c| (c as i32).wrapping_add((hash << 5).wrapping_sub(hash)));
    CURSOR_PALETTE[(hash.unsigned_abs() as usize) % CURSOR_PALETTE.len()]
}

/// One participant's view of a session: strokes in draw order, chat history
/// and the last known cursor of every other participant.
#[derive(Debug, Clone, Default)]
pub struct Board {
    strokes: Vec<Stroke>,
    chat: Vec<ChatMessage>,
    cursors: HashMap<String, CursorUpdate>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stroke on top. A stroke with the same id is replaced in place.
    pub fn add_stroke(&mut self, stroke: Stroke) {
        match self.strokes.iter_mut().find(|s| s.id == stroke.id) {
            Some(existing) => *existing = stroke,
            None => self.strokes.push(stroke),
        }
    }

    /// Remove a stroke by id.
    pub fn remove_stroke(&mut self, id: &str) -> Option<Stroke> {
        let index = self.strokes.iter().position(|s| s.id == id)?;
        Some(self.strokes.remove(index))
    }

    pub fn stroke(&self, id: &str) -> Option<&Stroke> {
        self.strokes.iter().find(|s| s.id == id)
    }

    /// Strokes back to front.
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn chat_messages(&self) -> &[ChatMessage] {
        &self.chat
    }

    pub fn cursors(&self) -> impl Iterator<Item = &CursorUpdate> {
        self.cursors.values()
    }

    pub fn cursor(&self, connection_id: &str) -> Option<&CursorUpdate> {
        self.cursors.get(connection_id)
    }

    /// Apply a message relayed by the server.
    pub fn apply(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::StrokeCreated(stroke) | ServerMessage::StrokeRedo(stroke) => {
                self.add_stroke(stroke);
            }
            ServerMessage::StrokeUndo { stroke_id } => {
                if self.remove_stroke(&stroke_id).is_none() {
                    log::debug!("Undo for unknown stroke {}", stroke_id);
                }
            }
            ServerMessage::Cursor(update) => {
                self.cursors.insert(update.id.clone(), update);
            }
            ServerMessage::ChatMessage(message) => {
                self.chat.push(message);
            }
            ServerMessage::ParticipantLeft { id } => {
                self.cursors.remove(&id);
            }
        }
    }
}
