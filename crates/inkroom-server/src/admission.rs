//! Connection admission and teardown.

use std::sync::Arc;

use axum::http::{HeaderMap, header};
use inkroom_core::ServerMessage;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::identity::{self, Identity};
use crate::registry::{ConnectionId, Member, RegistryError, SessionRegistry};

/// Reasons a connection attempt is turned away. The display text is what the
/// client sees as the close reason.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("No session ID provided")]
    MissingSessionId,
    #[error("Authentication error: No token provided")]
    MissingCredential,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Query parameters of the upgrade request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub session_id: Option<String>,
    pub token: Option<String>,
}

impl ConnectParams {
    /// The credential, preferring an `Authorization: Bearer` header.
    pub fn credential<'a>(&'a self, headers: &'a HeaderMap) -> Option<&'a str> {
        bearer_token(headers).or_else(|| {
            self.token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
        })
    }
}

/// Extract a bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// A live, admitted connection.
///
/// Dropping it removes the connection from its session and tells the
/// remaining members it left.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    session_id: String,
    identity: Identity,
    registry: Arc<SessionRegistry>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.registry.leave(&self.session_id, self.id);
        let left = ServerMessage::ParticipantLeft { id: self.id.to_string() };
        for member in self.registry.all_members(&self.session_id) {
            member.deliver(left.clone());
        }
        info!(connection = %self.id, session = %self.session_id, "Left session");
    }
}

/// Admit a connection: check parameters, resolve its identity and join it to
/// the session. Messages for it are queued on `tx`.
///
/// The session id is checked before the credential. A credential that is
/// present but does not decode is admitted as anonymous.
pub fn admit(
    registry: &Arc<SessionRegistry>,
    session_id: Option<&str>,
    credential: Option<&str>,
    tx: mpsc::Sender<ServerMessage>,
) -> Result<Connection, AdmissionError> {
    let session_id = session_id
        .filter(|s| !s.is_empty())
        .ok_or(AdmissionError::MissingSessionId)?;
    let credential = credential
        .filter(|c| !c.is_empty())
        .ok_or(AdmissionError::MissingCredential)?;

    let identity = identity::resolve(Some(credential));
    let id = Uuid::new_v4();
    registry.join(session_id, Member::new(id, identity.clone(), tx))?;

    info!(connection = %id, session = %session_id, user = %identity, "Joined session");
    Ok(Connection {
        id,
        session_id: session_id.to_string(),
        identity,
        registry: Arc::clone(registry),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn admit_with(
        registry: &Arc<SessionRegistry>,
        session_id: Option<&str>,
        credential: Option<&str>,
    ) -> (Result<Connection, AdmissionError>, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(8);
        (admit(registry, session_id, credential, tx), rx)
    }

    #[test]
    fn test_missing_session_id_checked_first() {
        let registry = Arc::new(SessionRegistry::new());
        let (result, _rx) = admit_with(&registry, None, None);
        assert!(matches!(result, Err(AdmissionError::MissingSessionId)));
        let (result, _rx) = admit_with(&registry, Some(""), Some("tok"));
        assert!(matches!(result, Err(AdmissionError::MissingSessionId)));
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_missing_credential() {
        let registry = Arc::new(SessionRegistry::new());
        let (result, _rx) = admit_with(&registry, Some("S1"), None);
        let err = result.unwrap_err();
        assert!(matches!(err, AdmissionError::MissingCredential));
        assert_eq!(err.to_string(), "Authentication error: No token provided");
        assert_eq!(registry.member_count("S1"), 0);
    }

    #[test]
    fn test_malformed_credential_is_admitted_anonymously() {
        let registry = Arc::new(SessionRegistry::new());
        let (result, _rx) = admit_with(&registry, Some("S1"), Some("abc"));
        let conn = result.unwrap();
        assert!(conn.identity().is_anonymous());
        assert_eq!(conn.session_id(), "S1");
        assert_eq!(registry.member_count("S1"), 1);
    }

    #[test]
    fn test_drop_leaves_and_notifies() {
        let registry = Arc::new(SessionRegistry::new());
        let (first, _rx1) = admit_with(&registry, Some("S1"), Some("abc"));
        let (second, mut rx2) = admit_with(&registry, Some("S1"), Some("abc"));
        let first = first.unwrap();
        let _second = second.unwrap();
        let first_id = first.id();

        drop(first);
        assert_eq!(registry.member_count("S1"), 1);
        assert_eq!(
            rx2.try_recv().unwrap(),
            ServerMessage::ParticipantLeft { id: first_id.to_string() }
        );
    }

    #[test]
    fn test_last_member_drop_ends_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (conn, _rx) = admit_with(&registry, Some("S1"), Some("abc"));
        drop(conn);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_bearer_header_wins() {
        let mut headers = HeaderMap::new();
        let params = ConnectParams {
            session_id: Some("S1".to_string()),
            token: Some("query-token".to_string()),
        };
        assert_eq!(params.credential(&headers), Some("query-token"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));
        assert_eq!(params.credential(&headers), Some("header-token"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(params.credential(&headers), Some("query-token"));
    }

    #[test]
    fn test_blank_query_token_is_absent() {
        let headers = HeaderMap::new();
        let params = ConnectParams {
            session_id: Some("S1".to_string()),
            token: Some("   ".to_string()),
        };
        assert_eq!(params.credential(&headers), None);

        let padded = ConnectParams {
            token: Some(" tok ".to_string()),
            ..params
        };
        assert_eq!(padded.credential(&headers), Some("tok"));
    }
}
