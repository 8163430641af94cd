//! InkRoom Core Library
//!
//! Wire protocol, replicated board state and undo history shared by InkRoom
//! clients and the relay server.

pub mod board;
pub mod collaboration;
pub mod history;
pub mod protocol;
pub mod stroke;
pub mod sync;

pub use board::{Board, cursor_color};
pub use collaboration::Collaboration;
pub use history::UndoRedo;
pub use protocol::{ChatMessage, ClientMessage, CursorUpdate, ProtocolError, ServerMessage};
pub use stroke::Stroke;
pub use sync::{ClientError, ConnectionState, SyncEvent};

#[cfg(not(target_arch = "wasm32"))]
pub use sync::NativeClient;
