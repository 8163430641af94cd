//! InkRoom relay server.
//!
//! Admits WebSocket connections into named sessions and relays typed drawing,
//! cursor and chat events between the members of each session. Nothing is
//! persisted: a session lives exactly as long as it has members.

pub mod admission;
pub mod config;
pub mod identity;
pub mod invite;
pub mod registry;
pub mod relay;
pub mod server;

pub use admission::{AdmissionError, Connection, admit};
pub use config::{ConfigError, ServerConfig};
pub use identity::{ANONYMOUS, Identity};
pub use invite::{LogMailer, Mailer};
pub use registry::{ConnectionId, SessionRegistry};
pub use server::{AppState, router};
