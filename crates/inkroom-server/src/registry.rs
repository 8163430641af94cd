//! Session membership.
//!
//! A session exists while it has at least one member. Each connection belongs
//! to at most one session.

use std::collections::HashMap;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use inkroom_core::ServerMessage;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

use crate::identity::Identity;

pub type ConnectionId = Uuid;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("connection {connection} is already a member of session {session}")]
    AlreadyInSession {
        connection: ConnectionId,
        session: String,
    },
}

/// A session member as seen by the relay: who it is and where to send.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: ConnectionId,
    pub identity: Identity,
    tx: mpsc::Sender<ServerMessage>,
}

impl Member {
    pub fn new(id: ConnectionId, identity: Identity, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, identity, tx }
    }

    /// Queue a message without waiting. A full or closed queue drops it.
    pub fn deliver(&self, msg: ServerMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(connection = %self.id, "Outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection = %self.id, "Outbound queue closed, dropping message");
                false
            }
        }
    }
}

/// Maps session ids to their current members.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, HashMap<ConnectionId, Member>>,
    /// Reverse index: connection -> session.
    memberships: DashMap<ConnectionId, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member to a session, creating the session if needed.
    ///
    /// Re-joining the same session is a no-op; joining a second session while
    /// still a member of another is an error.
    pub fn join(&self, session_id: &str, member: Member) -> Result<(), RegistryError> {
        match self.memberships.entry(member.id) {
            Entry::Occupied(existing) if existing.get() == session_id => return Ok(()),
            Entry::Occupied(existing) => {
                return Err(RegistryError::AlreadyInSession {
                    connection: member.id,
                    session: existing.get().clone(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(session_id.to_string());
            }
        }

        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(member.id, member);
        Ok(())
    }

    /// Remove a connection from a session. Empty sessions are dropped.
    pub fn leave(&self, session_id: &str, id: ConnectionId) -> bool {
        let removed = self
            .memberships
            .remove_if(&id, |_, session| session == session_id)
            .is_some();

        if let Some(mut members) = self.sessions.get_mut(session_id) {
            members.remove(&id);
        }
        self.sessions
            .remove_if(session_id, |_, members| members.is_empty());

        removed
    }

    /// Every member of a session except `id`.
    pub fn members_except(&self, session_id: &str, id: ConnectionId) -> Vec<Member> {
        self.sessions
            .get(session_id)
            .map(|members| {
                members
                    .values()
                    .filter(|m| m.id != id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every member of a session.
    pub fn all_members(&self, session_id: &str) -> Vec<Member> {
        self.sessions
            .get(session_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn session_of(&self, id: ConnectionId) -> Option<String> {
        self.memberships.get(&id).map(|s| s.clone())
    }

    pub fn member_count(&self, session_id: &str) -> usize {
        self.sessions.get(session_id).map_or(0, |m| m.len())
    }

    /// Number of sessions with at least one member.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
