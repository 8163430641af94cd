//! Typed event fan-out within a session.
//!
//! | event            | delivered to                    | transform                          |
//! |------------------|---------------------------------|------------------------------------|
//! | `stroke-created` | other members                   | none                               |
//! | `stroke-undo`    | other members                   | none                               |
//! | `stroke-redo`    | other members                   | none                               |
//! | `cursor`         | other members                   | adds connection id and username    |
//! | `chat-message`   | every member, sender included   | adds id, username and timestamp    |
//!
//! Delivery is fire-and-forget: nothing is acknowledged or retried.

use std::time::{SystemTime, UNIX_EPOCH};

use inkroom_core::{ChatMessage, ClientMessage, CursorUpdate, ServerMessage};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::admission::Connection;
use crate::registry::Member;

/// Decode a text frame from `conn` and relay it. Invalid payloads are logged
/// and dropped. Returns the number of members the event was queued for.
pub fn handle_text(conn: &Connection, text: &str) -> usize {
    match ClientMessage::decode(text) {
        Ok(msg) => relay(conn, msg),
        Err(e) => {
            warn!(
                connection = %conn.id(),
                session = %conn.session_id(),
                error = %e,
                "Dropping invalid payload"
            );
            0
        }
    }
}

/// Relay a decoded event from `conn` to its session.
pub fn relay(conn: &Connection, msg: ClientMessage) -> usize {
    let kind = msg.kind();
    let registry = conn.registry();

    let (targets, outbound) = match msg {
        ClientMessage::StrokeCreated(stroke) => (
            registry.members_except(conn.session_id(), conn.id()),
            ServerMessage::StrokeCreated(stroke),
        ),
        ClientMessage::StrokeUndo { stroke_id } => (
            registry.members_except(conn.session_id(), conn.id()),
            ServerMessage::StrokeUndo { stroke_id },
        ),
        ClientMessage::StrokeRedo(stroke) => (
            registry.members_except(conn.session_id(), conn.id()),
            ServerMessage::StrokeRedo(stroke),
        ),
        ClientMessage::Cursor { x, y } => (
            registry.members_except(conn.session_id(), conn.id()),
            ServerMessage::Cursor(CursorUpdate {
                id: conn.id().to_string(),
                username: conn.identity().to_string(),
                x,
                y,
            }),
        ),
        ClientMessage::ChatMessage { message } => (
            registry.all_members(conn.session_id()),
            ServerMessage::ChatMessage(ChatMessage {
                id: Uuid::new_v4().to_string(),
                username: conn.identity().to_string(),
                message,
                timestamp: now_millis(),
            }),
        ),
    };

    let delivered = fan_out(&targets, &outbound);
    debug!(
        connection = %conn.id(),
        session = %conn.session_id(),
        kind,
        delivered,
        "Relayed event"
    );
    delivered
}

fn fan_out(targets: &[Member], msg: &ServerMessage) -> usize {
    targets
        .iter()
        .filter(|member| member.deliver(msg.clone()))
        .count()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
