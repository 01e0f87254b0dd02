//! Matches asynchronous vCard replies back to whoever asked for them.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, trace};

use crate::domain::entities::{AvatarResponse, QueryId, UserIdentifier, Waiter};
use crate::domain::errors::AvatarError;

/// Outcome of [`Correlator::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// A new pending query was created; the caller must send it.
    Issued(QueryId),
    /// A query for the same identifier is already in flight; the waiter was
    /// attached to it and nothing must be sent.
    Joined(QueryId),
}

impl Registration {
    #[must_use]
    pub const fn query_id(&self) -> &QueryId {
        match self {
            Self::Issued(id) | Self::Joined(id) => id,
        }
    }
}

#[derive(Debug, Error)]
pub enum CorrelatorError {
    #[error("query id {query_id} is already registered")]
    DuplicateQueryId { query_id: QueryId, waiter: Waiter },

    #[error("no pending query with id {0}")]
    NotFound(QueryId),

    #[error("reply to {query_id} came from {sender}, expected {expected}")]
    SenderMismatch {
        query_id: QueryId,
        sender: String,
        expected: UserIdentifier,
    },
}

/// An outbound query that has not been answered yet.
#[derive(Debug)]
pub struct PendingQuery {
    query_id: QueryId,
    identifier: UserIdentifier,
    waiters: Vec<Waiter>,
}

impl PendingQuery {
    #[must_use]
    pub const fn query_id(&self) -> &QueryId {
        &self.query_id
    }

    #[must_use]
    pub const fn identifier(&self) -> &UserIdentifier {
        &self.identifier
    }

    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    /// Returns true if nobody but background refreshes is waiting.
    #[must_use]
    pub fn is_background_only(&self) -> bool {
        self.waiters.iter().all(Waiter::is_background)
    }

    /// Hands the same response to every waiter.
    pub fn complete(self, response: &AvatarResponse) {
        for waiter in self.waiters {
            waiter.complete(response.clone());
        }
    }

    pub fn fail(self, error: &AvatarError) {
        self.complete(&error.to_response());
    }
}

#[derive(Default)]
struct CorrelatorState {
    pending: HashMap<QueryId, PendingQuery>,
    in_flight: HashMap<UserIdentifier, QueryId>,
}

/// Table of in-flight queries, keyed by id and coalesced per identifier.
///
/// Every method takes the lock for a single step and never across an await.
#[derive(Default)]
pub struct Correlator {
    state: Mutex<CorrelatorState>,
}

impl Correlator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `waiter` until `query_id` is answered, or attaches it to the
    /// query already in flight for `identifier`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateQueryId`, handing the waiter back, if `query_id` is
    /// already pending under another identifier.
    pub fn register(
        &self,
        identifier: &UserIdentifier,
        query_id: QueryId,
        waiter: Waiter,
    ) -> Result<Registration, CorrelatorError> {
        let mut state = self.state.lock();

        if let Some(existing) = state.in_flight.get(identifier).cloned()
            && let Some(pending) = state.pending.get_mut(&existing)
        {
            pending.waiters.push(waiter);
            debug!(
                identifier = %identifier,
                query_id = %existing,
                waiters = pending.waiters.len(),
                "Joined in-flight query"
            );
            return Ok(Registration::Joined(existing));
        }

        if state.pending.contains_key(&query_id) {
            return Err(CorrelatorError::DuplicateQueryId { query_id, waiter });
        }

        state
            .in_flight
            .insert(identifier.clone(), query_id.clone());
        state.pending.insert(
            query_id.clone(),
            PendingQuery {
                query_id: query_id.clone(),
                identifier: identifier.clone(),
                waiters: vec![waiter],
            },
        );
        trace!(identifier = %identifier, query_id = %query_id, "Registered query");

        Ok(Registration::Issued(query_id))
    }

    /// Removes and returns the pending query for `query_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for stray, duplicate or expired replies.
    pub fn resolve(&self, query_id: &QueryId) -> Result<PendingQuery, CorrelatorError> {
        let mut state = self.state.lock();

        let pending = state
            .pending
            .remove(query_id)
            .ok_or_else(|| CorrelatorError::NotFound(query_id.clone()))?;

        if state.in_flight.get(&pending.identifier) == Some(query_id) {
            state.in_flight.remove(&pending.identifier);
        }

        Ok(pending)
    }

    /// Like [`Self::resolve`], but leaves the query pending when `sender` is
    /// not the identifier it was sent to. An absent sender is accepted.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `SenderMismatch`.
    pub fn resolve_from(
        &self,
        query_id: &QueryId,
        sender: Option<&str>,
    ) -> Result<PendingQuery, CorrelatorError> {
        if let Some(sender) = sender {
            let state = self.state.lock();
            let pending = state
                .pending
                .get(query_id)
                .ok_or_else(|| CorrelatorError::NotFound(query_id.clone()))?;
            if !sender_matches(sender, &pending.identifier) {
                return Err(CorrelatorError::SenderMismatch {
                    query_id: query_id.clone(),
                    sender: sender.to_string(),
                    expected: pending.identifier.clone(),
                });
            }
        }

        self.resolve(query_id)
    }

    /// Id of the query currently in flight for `identifier`, if any.
    #[must_use]
    pub fn in_flight(&self, identifier: &UserIdentifier) -> Option<QueryId> {
        self.state.lock().in_flight.get(identifier).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compares the bare part of a reply's sender with the queried identifier.
///
/// Servers case-fold localparts and domains, so the comparison ignores case
/// beyond ASCII.
fn sender_matches(sender: &str, identifier: &UserIdentifier) -> bool {
    let bare = sender.split_once('/').map_or(sender, |(bare, _)| bare);
    bare == identifier.as_str() || bare.to_lowercase() == identifier.as_str().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ResponseHandle;

    fn alice() -> UserIdentifier {
        UserIdentifier::new_unchecked("alice@example.org")
    }

    #[test]
    fn test_resolve_unknown_is_not_found() {
        let correlator = Correlator::new();
        assert!(matches!(
            correlator.resolve(&QueryId::from(7_u64)),
            Err(CorrelatorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_register_then_resolve_once() {
        let correlator = Correlator::new();
        let (handle, rx) = ResponseHandle::channel();

        let registration = correlator
            .register(&alice(), QueryId::from(43_u64), Waiter::Http(handle))
            .unwrap();
        assert_eq!(registration, Registration::Issued(QueryId::from(43_u64)));
        assert_eq!(correlator.in_flight(&alice()), Some(QueryId::from(43_u64)));

        let pending = correlator.resolve(&QueryId::from(43_u64)).unwrap();
        assert_eq!(pending.identifier(), &alice());
        assert_eq!(pending.waiter_count(), 1);
        pending.complete(&AvatarResponse::text(200, "done"));
        assert_eq!(rx.await.unwrap().status, 200);

        assert!(matches!(
            correlator.resolve(&QueryId::from(43_u64)),
            Err(CorrelatorError::NotFound(_))
        ));
        assert!(correlator.in_flight(&alice()).is_none());
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_duplicate_id_is_rejected_with_waiter() {
        let correlator = Correlator::new();
        let bob = UserIdentifier::new_unchecked("bob@example.org");

        correlator
            .register(&alice(), QueryId::from(43_u64), Waiter::Background)
            .unwrap();
        let err = correlator
            .register(&bob, QueryId::from(43_u64), Waiter::Background)
            .unwrap_err();

        assert!(matches!(
            err,
            CorrelatorError::DuplicateQueryId { waiter: Waiter::Background, .. }
        ));
        assert_eq!(correlator.len(), 1);
    }

    #[tokio::test]
    async fn test_same_identifier_is_coalesced() {
        let correlator = Correlator::new();
        let (first, rx1) = ResponseHandle::channel();
        let (second, rx2) = ResponseHandle::channel();

        correlator
            .register(&alice(), QueryId::from(43_u64), Waiter::Http(first))
            .unwrap();
        let joined = correlator
            .register(&alice(), QueryId::from(44_u64), Waiter::Http(second))
            .unwrap();

        assert_eq!(joined, Registration::Joined(QueryId::from(43_u64)));
        assert_eq!(correlator.len(), 1);

        let pending = correlator.resolve(&QueryId::from(43_u64)).unwrap();
        assert_eq!(pending.waiter_count(), 2);
        assert!(!pending.is_background_only());
        pending.fail(&AvatarError::remote(Some("item-not-found")));

        assert_eq!(rx1.await.unwrap().status, 500);
        assert_eq!(rx2.await.unwrap().status, 500);
    }

    #[test]
    fn test_reply_from_wrong_sender_stays_pending() {
        let correlator = Correlator::new();
        correlator
            .register(&alice(), QueryId::from(43_u64), Waiter::Background)
            .unwrap();

        let err = correlator
            .resolve_from(&QueryId::from(43_u64), Some("mallory@example.org"))
            .unwrap_err();
        assert!(matches!(err, CorrelatorError::SenderMismatch { .. }));
        assert_eq!(correlator.len(), 1);

        let pending = correlator
            .resolve_from(&QueryId::from(43_u64), Some("Alice@Example.org/res"))
            .unwrap();
        assert_eq!(pending.identifier(), &alice());
    }

    #[test]
    fn test_sender_case_folding_is_unicode_aware() {
        let correlator = Correlator::new();
        let elodie = UserIdentifier::new_unchecked("Élodie@example.org");
        correlator
            .register(&elodie, QueryId::from(43_u64), Waiter::Background)
            .unwrap();

        let pending = correlator
            .resolve_from(&QueryId::from(43_u64), Some("élodie@example.org/laptop"))
            .unwrap();
        assert_eq!(pending.identifier(), &elodie);
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_reply_without_sender_is_accepted() {
        let correlator = Correlator::new();
        correlator
            .register(&alice(), QueryId::from(43_u64), Waiter::Background)
            .unwrap();
        assert!(correlator.resolve_from(&QueryId::from(43_u64), None).is_ok());
    }

    #[test]
    fn test_background_only() {
        let correlator = Correlator::new();
        correlator
            .register(&alice(), QueryId::from(50_u64), Waiter::Background)
            .unwrap();
        let pending = correlator.resolve(&QueryId::from(50_u64)).unwrap();
        assert!(pending.is_background_only());
        pending.complete(&AvatarResponse::text(200, "nobody listens"));
    }
}
