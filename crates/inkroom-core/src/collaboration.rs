//! Client-side collaboration driver.
//!
//! Owns the local [`Board`], the participant's own undo history and a queue of
//! outgoing wire messages. Strokes and cursor moves are applied locally right
//! away and only relayed to others; chat messages are applied when the relay
//! echoes them back with their assigned id and timestamp.

use kurbo::Point;

use crate::board::Board;
use crate::history::UndoRedo;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::stroke::{DEFAULT_COLOR, DEFAULT_WIDTH, Stroke};

/// Drives one participant's side of a session.
pub struct Collaboration {
    board: Board,
    history: UndoRedo<Stroke>,
    /// Stroke currently being drawn, not yet broadcast.
    current: Option<Stroke>,
    color: String,
    width: f64,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
}

impl Collaboration {
    pub fn new() -> Self {
        Self::with_history(UndoRedo::new())
    }

    /// Use a preconfigured history, e.g. [`UndoRedo::bounded`].
    pub fn with_history(history: UndoRedo<Stroke>) -> Self {
        Self {
            board: Board::new(),
            history,
            current: None,
            color: DEFAULT_COLOR.to_string(),
            width: DEFAULT_WIDTH,
            outgoing: Vec::new(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn current_stroke(&self) -> Option<&Stroke> {
        self.current.as_ref()
    }

    /// Brush used for the next stroke.
    pub fn set_brush(&mut self, color: impl Into<String>, width: f64) {
        self.color = color.into();
        self.width = width;
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // --- Drawing ---

    /// Start a stroke at `pos`.
    pub fn begin_stroke(&mut self, pos: Point) {
        self.current = Some(Stroke::begin(pos, self.color.clone(), self.width));
    }

    /// Extend the stroke in progress and report the pointer position.
    pub fn extend_stroke(&mut self, pos: Point) {
        if let Some(stroke) = self.current.as_mut() {
            stroke.add_point(pos);
            self.move_cursor(pos);
        }
    }

    /// Finish the stroke in progress: apply locally, record it and broadcast.
    pub fn end_stroke(&mut self) -> Option<&Stroke> {
        let stroke = self.current.take()?;
        let id = stroke.id.clone();
        self.commit_stroke(stroke);
        self.board.stroke(&id)
    }

    /// Apply, record and broadcast a finished stroke.
    pub fn commit_stroke(&mut self, stroke: Stroke) {
        self.queue(&ClientMessage::StrokeCreated(stroke.clone()));
        self.history.push(stroke.clone());
        self.board.add_stroke(stroke);
    }

    /// Retract the most recent own stroke. Returns its id.
    pub fn undo(&mut self) -> Option<String> {
        let stroke = self.history.undo()?;
        self.board.remove_stroke(&stroke.id);
        self.queue(&ClientMessage::StrokeUndo { stroke_id: stroke.id.clone() });
        Some(stroke.id)
    }

    /// Re-apply the most recently retracted stroke. Returns its id.
    pub fn redo(&mut self) -> Option<String> {
        let stroke = self.history.redo()?;
        let id = stroke.id.clone();
        self.queue(&ClientMessage::StrokeRedo(stroke.clone()));
        self.board.add_stroke(stroke);
        Some(id)
    }

    // --- Presence and chat ---

    pub fn move_cursor(&mut self, pos: Point) {
        self.queue(&ClientMessage::Cursor { x: pos.x, y: pos.y });
    }

    /// Queue a chat message, trimmed. It shows up on the board once echoed back.
    pub fn send_chat(&mut self, message: &str) -> bool {
        let msg = ClientMessage::ChatMessage { message: message.trim().to_string() };
        if msg.validate().is_err() {
            return false;
        }
        self.queue(&msg);
        true
    }

    // --- Transport ---

    fn queue(&mut self, msg: &ClientMessage) {
        match msg.encode() {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::error!("Failed to encode {} message: {}", msg.kind(), e),
        }
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Handle an incoming server frame. Returns the applied message, or `None`
    /// if the frame could not be decoded.
    pub fn handle_message(&mut self, json: &str) -> Option<ServerMessage> {
        match ServerMessage::decode(json) {
            Ok(msg) => {
                self.board.apply(msg.clone());
                Some(msg)
            }
            Err(e) => {
                log::warn!("Dropping server message: {}", e);
                None
            }
        }
    }

    /// Apply an already decoded server message.
    pub fn apply(&mut self, msg: ServerMessage) {
        self.board.apply(msg);
    }
}

impl Default for Collaboration {
    fn default() -> Self {
        Self::new()
    }
}
