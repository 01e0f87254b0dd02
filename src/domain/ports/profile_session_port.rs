//! Outbound side of the XMPP session as seen by the gateway.

use async_trait::async_trait;

use crate::domain::entities::{QueryId, UserIdentifier};
use crate::domain::errors::SessionResult;

/// Issues vCard queries on the persistent session.
///
/// Allocation and sending are split so the caller can register the id
/// before the query leaves the process.
#[async_trait]
pub trait ProfileSessionPort: Send + Sync {
    /// Allocates the next correlation token. Tokens are never reused.
    fn next_query_id(&self) -> QueryId;

    /// Sends a vCard get addressed to `to`, tagged with `id`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the stanza cannot be queued.
    async fn send_profile_query(&self, id: &QueryId, to: &UserIdentifier) -> SessionResult<()>;
}
