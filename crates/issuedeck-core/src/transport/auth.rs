//! Authentication header construction.

use crate::config::TrackerConfig;
use crate::error::{IssuedeckError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Resolved authentication material.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Personal access token sent as a bearer header.
    Bearer { token: String },
    /// Email and API token combined into one basic credential.
    Basic { email: String, token: String },
}

impl Auth {
    /// Pick the auth strategy from the configured discriminant.
    pub fn resolve(config: &TrackerConfig) -> Result<Self> {
        let token = config.token.trim();
        if token.is_empty() {
            return Err(IssuedeckError::config("An API token is required"));
        }

        if config.uses_bearer_auth() {
            return Ok(Auth::Bearer {
                token: token.to_string(),
            });
        }

        match config.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => Ok(Auth::Basic {
                email: email.to_string(),
                token: token.to_string(),
            }),
            _ => Err(IssuedeckError::config(
                "Basic auth requires an email; set auth_type to \"pat\" for token-only auth",
            )),
        }
    }

    /// Value of the `Authorization` header.
    pub fn header_value(&self) -> String {
        match self {
            Auth::Bearer { token } => format!("Bearer {}", token),
            Auth::Basic { email, token } => {
                format!("Basic {}", STANDARD.encode(format!("{}:{}", email, token)))
            }
        }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Bearer { .. } => f.debug_struct("Bearer").field("token", &"<redacted>").finish(),
            Auth::Basic { email, .. } => f
                .debug_struct("Basic")
                .field("email", email)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}
