//! Correlation tokens and the response capability parked behind them.

use std::fmt;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::debug;

use super::ImageExtension;

/// Correlation token carried in the `id` attribute of an outbound IQ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryId(String);

impl QueryId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for QueryId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for QueryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A complete HTTP answer produced by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Bytes,
}

impl AvatarResponse {
    pub const TEXT_PLAIN: &'static str = "text/plain; charset=utf-8";

    #[must_use]
    pub fn image(extension: ImageExtension, body: Bytes) -> Self {
        Self {
            status: 200,
            content_type: extension.mime_type(),
            body,
        }
    }

    #[must_use]
    pub fn text(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Self::TEXT_PLAIN,
            body: Bytes::from(message.into()),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// One-shot capability to complete a parked HTTP response.
///
/// Completion consumes the handle. If the client already went away the
/// answer is dropped silently.
pub struct ResponseHandle {
    tx: oneshot::Sender<AvatarResponse>,
}

impl ResponseHandle {
    /// Creates a handle together with the receiver the HTTP layer awaits.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<AvatarResponse>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn complete(self, response: AvatarResponse) {
        if self.tx.send(response).is_err() {
            debug!("HTTP client went away before the response was ready");
        }
    }

    /// Returns true if the receiving side has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Whoever is waiting on a pending query.
#[derive(Debug)]
pub enum Waiter {
    /// A live HTTP request.
    Http(ResponseHandle),
    /// A speculative refresh with no observable caller.
    Background,
}

impl Waiter {
    pub fn complete(self, response: AvatarResponse) {
        match self {
            Self::Http(handle) => handle.complete(response),
            Self::Background => {}
        }
    }

    #[must_use]
    pub const fn is_background(&self) -> bool {
        matches!(self, Self::Background)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_delivers_once() {
        let (handle, rx) = ResponseHandle::channel();
        handle.complete(AvatarResponse::text(500, "boom"));

        let response = rx.await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.content_type, AvatarResponse::TEXT_PLAIN);
        assert_eq!(&response.body[..], b"boom");
    }

    #[test]
    fn test_complete_after_client_left_is_noop() {
        let (handle, rx) = ResponseHandle::channel();
        drop(rx);
        assert!(handle.is_closed());
        handle.complete(AvatarResponse::text(200, "ignored"));
    }

    #[test]
    fn test_query_id_from_counter() {
        assert_eq!(QueryId::from(43_u64).as_str(), "43");
    }
}
