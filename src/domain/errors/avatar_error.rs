//! Failures surfaced to the HTTP caller of `/avatar/<identifier>`.

use thiserror::Error;

use super::{DecodeError, SessionError};
use crate::domain::entities::AvatarResponse;
use crate::domain::ports::CacheError;

/// Every way a parked avatar request can end without an image.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum AvatarError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("remote returned an error: {condition}")]
    Remote { condition: String },

    #[error("no reply within {secs}s")]
    Timeout { secs: u64 },

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AvatarError {
    /// Condition reported when the `<error/>` element names nothing.
    pub const UNKNOWN_CONDITION: &'static str = "none";

    #[must_use]
    pub fn remote(condition: Option<impl Into<String>>) -> Self {
        Self::Remote {
            condition: condition.map_or_else(|| Self::UNKNOWN_CONDITION.to_string(), Into::into),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> u16 {
        500
    }

    /// Stable text shown to the HTTP client.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Decode(e) => e.user_message().to_string(),
            Self::Remote { condition } => {
                format!("Error during query of this user’s vCard: “{condition}”.")
            }
            Self::Timeout { .. } => "Error: timed out waiting for this user’s vCard.".to_string(),
            Self::Session(_) => "Error: the XMPP session is unavailable.".to_string(),
            Self::Cache(_) => "Error: the avatar cache is unavailable.".to_string(),
            Self::Internal { .. } => "Error: internal error.".to_string(),
        }
    }

    #[must_use]
    pub fn to_response(&self) -> AvatarResponse {
        AvatarResponse::text(self.status(), self.user_message())
    }
}
