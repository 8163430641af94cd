//! Display-name resolution from a bearer credential.
//!
//! The credential is decoded, never verified. Anything that does not decode
//! to a usable claim set yields [`ANONYMOUS`].

use std::fmt;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const ANONYMOUS: &str = "Anonymous";

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const URL_SAFE: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
const STANDARD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// Why a credential did not yield a name. Never surfaced to clients.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("expected 3 dot-separated segments, found {0}")]
    Segments(usize),
    #[error("payload is not base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("payload is not a JSON claim set: {0}")]
    Claims(#[from] serde_json::Error),
}

/// The subset of token claims used for display.
#[derive(Debug, Default)]
pub struct Claims {
    pub preferred_username: Option<String>,
    pub sub: Option<String>,
}

impl Claims {
    /// Pick the name claims out of a decoded payload. A claim that is not a
    /// string is treated as absent.
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            preferred_username: text("preferred_username"),
            sub: text("sub"),
        }
    }

    /// Preferred display field, then subject.
    pub fn display_name(&self) -> Option<&str> {
        [&self.preferred_username, &self.sub]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|name| !name.is_empty())
    }
}

/// A connection's display name, fixed at admission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decode the claim segment of a `header.payload.signature` token.
pub fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenError::Segments(segments.len()));
    }
    let payload = segments[1];
    let bytes = URL_SAFE
        .decode(payload)
        .or_else(|_| STANDARD.decode(payload))?;
    let value: Value = serde_json::from_slice(&bytes)?;
    Ok(Claims::from_value(&value))
}

/// Resolve a display name, falling back to [`ANONYMOUS`].
pub fn resolve(credential: Option<&str>) -> Identity {
    let Some(token) = credential else {
        return Identity::anonymous();
    };
    match decode_claims(token) {
        Ok(claims) => claims
            .display_name()
            .map(Identity::new)
            .unwrap_or_else(Identity::anonymous),
        Err(e) => {
            debug!(error = %e, "Credential did not decode, using anonymous identity");
            Identity::anonymous()
        }
    }
}
