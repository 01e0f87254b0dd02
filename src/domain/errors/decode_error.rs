//! vCard avatar decoding failures.

use thiserror::Error;

/// Why a profile document did not yield a usable avatar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("reply carries no vCard")]
    NoProfile,

    #[error("vCard has no PHOTO/BINVAL")]
    NoAvatar,

    #[error("vCard PHOTO has no TYPE")]
    UnknownFormat,

    #[error("unsupported avatar MIME type: {mime}")]
    UnsupportedFormat { mime: String },

    #[error("BINVAL is not valid base64: {reason}")]
    CorruptPayload { reason: String },
}

impl DecodeError {
    #[must_use]
    pub fn unsupported(mime: impl Into<String>) -> Self {
        Self::UnsupportedFormat { mime: mime.into() }
    }

    #[must_use]
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptPayload {
            reason: reason.into(),
        }
    }

    /// Stable text shown to the HTTP client.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::NoProfile => "Error: this user doesn’t have a vCard.",
            Self::NoAvatar => "Error: this user doesn’t have an avatar in their vCard.",
            Self::UnknownFormat => {
                "Error: this user’s vCard doesn’t specify the MIME type of its avatar."
            }
            Self::UnsupportedFormat { .. } => "Error: this user’s avatar is in an unknown format.",
            Self::CorruptPayload { .. } => "Error: this user’s avatar data is corrupt.",
        }
    }
}
