//! XMPP component session errors.

use std::io;

use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("component authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("connection closed: {reason}")]
    ConnectionClosed { reason: String },

    #[error("stream error: {message}")]
    Stream { message: String },

    #[error("timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("outbound queue closed")]
    ChannelClosed,

    #[error("not connected to server")]
    NotConnected,

    #[error("already connecting or connected")]
    AlreadyConnected,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    #[must_use]
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    #[must_use]
    pub const fn should_reconnect(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ConnectionClosed { .. }
                | Self::Stream { .. }
                | Self::Timeout { .. }
                | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_policy() {
        assert!(SessionError::connection_failed("refused").should_reconnect());
        assert!(SessionError::closed("eof").should_reconnect());
        assert!(!SessionError::auth_failed("bad secret").should_reconnect());
        assert!(!SessionError::ChannelClosed.should_reconnect());
    }
}
