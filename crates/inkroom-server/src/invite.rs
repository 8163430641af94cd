//! Session invitations by email.
//!
//! `POST /api/invite` validates the request, builds the shareable session URL
//! and hands the rendered invitation to a [`Mailer`].

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};

use askama::Template;
use axum::{Json, extract::State, http::StatusCode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::server::AppState;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Boxed future returned by [`Mailer`] implementations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("failed to render invitation: {0}")]
    Render(#[from] askama::Error),
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// Outbound mail delivery.
pub trait Mailer: Send + Sync {
    fn send<'a>(&'a self, invitation: &'a Invitation) -> BoxFuture<'a, Result<(), MailError>>;
}

/// Mailer that renders the invitation and writes it to the log instead of
/// delivering it.
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

impl Mailer for LogMailer {
    fn send<'a>(&'a self, invitation: &'a Invitation) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(async move {
            let text = invitation.text_body()?;
            let html = invitation.html_body()?;
            info!(
                from = %self.from,
                to = %invitation.recipient,
                subject = %invitation.subject(),
                html_bytes = html.len(),
                "Invitation email"
            );
            debug!(body = %text, "Invitation text body");
            Ok(())
        })
    }
}

/// Request body. Fields are optional so missing ones get a friendly 400.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InviteResponse {
    pub success: bool,
    pub message: String,
}

impl InviteResponse {
    fn new(success: bool, message: &str) -> Self {
        Self {
            success,
            message: message.to_string(),
        }
    }
}

/// An invitation ready to be rendered and delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct Invitation {
    pub recipient: String,
    pub sender_name: String,
    pub session_id: String,
    pub session_url: String,
}

impl Invitation {
    pub fn new(frontend_url: &str, recipient: &str, sender_name: &str, session_id: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            sender_name: sender_name.to_string(),
            session_id: session_id.to_string(),
            session_url: session_url(frontend_url, session_id),
        }
    }

    pub fn subject(&self) -> String {
        format!("{} invited you to collaborate on a whiteboard", self.sender_name)
    }

    /// Plain-text body.
    pub fn text_body(&self) -> Result<String, askama::Error> {
        InvitationText::from(self).render()
    }

    /// HTML body. Interpolated fields are escaped by the template.
    pub fn html_body(&self) -> Result<String, askama::Error> {
        InvitationHtml::from(self).render()
    }
}

#[derive(Template)]
#[template(path = "invitation.html")]
struct InvitationHtml<'a> {
    sender_name: &'a str,
    session_id: &'a str,
    session_url: &'a str,
}

#[derive(Template)]
#[template(path = "invitation.txt")]
struct InvitationText<'a> {
    sender_name: &'a str,
    session_id: &'a str,
    session_url: &'a str,
}

impl<'a> From<&'a Invitation> for InvitationHtml<'a> {
    fn from(inv: &'a Invitation) -> Self {
        Self {
            sender_name: &inv.sender_name,
            session_id: &inv.session_id,
            session_url: &inv.session_url,
        }
    }
}

impl<'a> From<&'a Invitation> for InvitationText<'a> {
    fn from(inv: &'a Invitation) -> Self {
        Self {
            sender_name: &inv.sender_name,
            session_id: &inv.session_id,
            session_url: &inv.session_url,
        }
    }
}

/// Shareable URL for a session.
pub fn session_url(frontend_url: &str, session_id: &str) -> String {
    format!("{}/session/{}", frontend_url.trim_end_matches('/'), session_id)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.is_empty())
}

/// `POST /api/invite`
pub async fn invite(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InviteRequest>,
) -> (StatusCode, Json<InviteResponse>) {
    let (Some(email), Some(sender_name), Some(session_id)) = (
        present(&req.email),
        present(&req.sender_name),
        present(&req.session_id),
    ) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(InviteResponse::new(
                false,
                "Missing required fields: email, senderName, or sessionId",
            )),
        );
    };

    if !is_valid_email(email) {
        return (
            StatusCode::BAD_REQUEST,
            Json(InviteResponse::new(false, "Invalid email address")),
        );
    }

    let invitation = Invitation::new(&state.config.frontend_url, email, sender_name, session_id);
    match state.mailer.send(&invitation).await {
        Ok(()) => {
            info!(session = %session_id, "Invitation sent");
            (
                StatusCode::OK,
                Json(InviteResponse::new(true, "Invitation sent successfully")),
            )
        }
        Err(e) => {
            error!(error = %e, session = %session_id, "Error sending invitation");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(InviteResponse::new(
                    false,
                    "Failed to send invitation. Please try again later.",
                )),
            )
        }
    }
}
