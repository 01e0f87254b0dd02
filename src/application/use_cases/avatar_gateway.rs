//! Avatar gateway: serves `/avatar/<identifier>` from the cache or parks the
//! request until the matching vCard reply arrives.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::application::dto::{ProfileReply, ReplyOutcome};
use crate::application::services::{
    AvatarCache, Correlator, CorrelatorError, MimePolicy, Registration, decode_avatar,
    run_guarded,
};
use crate::domain::entities::{AvatarResponse, QueryId, ResponseHandle, UserIdentifier, Waiter};
use crate::domain::errors::AvatarError;
use crate::domain::ports::{CacheError, ClockPort, ProfileSessionPort};

/// Age after which a cached avatar is refreshed in the background.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// How long a parked request waits for its vCard reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_age: Duration,
    pub reply_timeout: Duration,
    pub mime_policy: MimePolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            mime_policy: MimePolicy::default(),
        }
    }
}

impl GatewayConfig {
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    #[must_use]
    pub const fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_mime_policy(mut self, policy: MimePolicy) -> Self {
        self.mime_policy = policy;
        self
    }
}

/// Ties the HTTP front, the cache and the XMPP session together.
#[derive(Clone)]
pub struct AvatarGateway {
    cache: Arc<AvatarCache>,
    correlator: Arc<Correlator>,
    session: Arc<dyn ProfileSessionPort>,
    clock: Arc<dyn ClockPort>,
    config: GatewayConfig,
}

impl AvatarGateway {
    #[must_use]
    pub fn new(
        cache: Arc<AvatarCache>,
        session: Arc<dyn ProfileSessionPort>,
        clock: Arc<dyn ClockPort>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            cache,
            correlator: Arc::new(Correlator::new()),
            session,
            clock,
            config,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &AvatarCache {
        &self.cache
    }

    #[must_use]
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Answers `handle` for `identifier`.
    ///
    /// A cached avatar is served immediately and refreshed afterwards if it
    /// is stale. Otherwise a vCard query is issued, or joined if one is
    /// already in flight, and `handle` is completed when it resolves.
    pub async fn fetch(&self, identifier: UserIdentifier, handle: ResponseHandle) {
        if self.cache.has(&identifier) {
            match self.cache.read(&identifier).await {
                Ok((ext, bytes)) => {
                    debug!(id = %identifier, ext = %ext, "Serving cached avatar");
                    handle.complete(AvatarResponse::image(ext, bytes));
                    self.spawn_refresh(identifier);
                    return;
                }
                Err(CacheError::NotFound(_)) => {
                    debug!(id = %identifier, "Cached avatar vanished, querying instead");
                }
                Err(e) => {
                    warn!(id = %identifier, error = %e, "Failed to read cached avatar");
                    handle.complete(AvatarError::from(e).to_response());
                    return;
                }
            }
        }

        self.issue_query(&identifier, Waiter::Http(handle)).await;
    }

    fn spawn_refresh(&self, identifier: UserIdentifier) {
        let gateway = self.clone();
        tokio::spawn(run_guarded("avatar refresh", async move {
            gateway.refresh_if_stale(&identifier).await;
        }));
    }

    /// Evicts a stale cache entry and re-queries it with nobody waiting.
    ///
    /// Returns true if a new query went out.
    pub async fn refresh_if_stale(&self, identifier: &UserIdentifier) -> bool {
        if self.correlator.in_flight(identifier).is_some() {
            return false;
        }

        let entry = match self.cache.entry(identifier).await {
            Ok(entry) => entry,
            Err(e) => {
                debug!(id = %identifier, error = %e, "Skipping refresh");
                return false;
            }
        };

        let max_age = chrono::Duration::from_std(self.config.max_age)
            .unwrap_or(chrono::Duration::MAX);
        if !entry.is_stale(self.clock.now(), max_age) {
            return false;
        }

        match self.cache.remove(identifier).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(id = %identifier, error = %e, "Failed to evict stale avatar");
                return false;
            }
        }

        info!(id = %identifier, mtime = %entry.mtime, "Refreshing stale avatar");
        matches!(
            self.issue_query(identifier, Waiter::Background).await,
            Some(Registration::Issued(_))
        )
    }

    async fn issue_query(
        &self,
        identifier: &UserIdentifier,
        waiter: Waiter,
    ) -> Option<Registration> {
        let query_id = self.session.next_query_id();

        let registration = match self.correlator.register(identifier, query_id, waiter) {
            Ok(registration) => registration,
            Err(CorrelatorError::DuplicateQueryId { query_id, waiter }) => {
                warn!(id = %identifier, query_id = %query_id, "Query id already pending");
                waiter.complete(
                    AvatarError::internal(format!("query id {query_id} reused")).to_response(),
                );
                return None;
            }
            Err(e) => {
                warn!(id = %identifier, error = %e, "Failed to register query");
                return None;
            }
        };

        let Registration::Issued(query_id) = &registration else {
            return Some(registration);
        };

        self.spawn_reply_timeout(query_id.clone());

        match self.session.send_profile_query(query_id, identifier).await {
            Ok(()) => {
                info!(id = %identifier, query_id = %query_id, "Sent vCard query");
            }
            Err(e) => {
                warn!(id = %identifier, query_id = %query_id, error = %e, "Failed to send vCard query");
                if let Ok(pending) = self.correlator.resolve(query_id) {
                    pending.fail(&AvatarError::Session(e));
                }
            }
        }

        Some(registration)
    }

    fn spawn_reply_timeout(&self, query_id: QueryId) {
        let correlator = Arc::clone(&self.correlator);
        let timeout = self.config.reply_timeout;
        tokio::spawn(run_guarded("reply timeout", async move {
            tokio::time::sleep(timeout).await;
            if let Ok(pending) = correlator.resolve(&query_id) {
                warn!(
                    id = %pending.identifier(),
                    query_id = %query_id,
                    waiters = pending.waiter_count(),
                    "Timed out waiting for vCard reply"
                );
                pending.fail(&AvatarError::Timeout {
                    secs: timeout.as_secs(),
                });
            }
        }));
    }

    /// Completes the query `reply` answers.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `SenderMismatch` when the reply belongs to no
    /// pending query; the caller treats it as stray.
    pub async fn on_reply(&self, reply: ProfileReply) -> Result<(), CorrelatorError> {
        let pending = self
            .correlator
            .resolve_from(&reply.query_id, reply.from.as_deref())?;
        let identifier = pending.identifier().clone();

        let vcard = match reply.outcome {
            ReplyOutcome::Error { condition } => {
                let error = AvatarError::remote(condition);
                info!(id = %identifier, query_id = %reply.query_id, error = %error, "vCard query failed");
                pending.fail(&error);
                return Ok(());
            }
            ReplyOutcome::Profile(vcard) => vcard,
        };

        let avatar = match decode_avatar(vcard.as_ref(), self.config.mime_policy) {
            Ok(avatar) => avatar,
            Err(e) => {
                info!(id = %identifier, query_id = %reply.query_id, error = %e, "No usable avatar");
                pending.fail(&AvatarError::from(e));
                return Ok(());
            }
        };

        if let Err(e) = self.cache.write(&identifier, &avatar).await {
            warn!(id = %identifier, error = %e, "Failed to cache avatar");
            pending.fail(&AvatarError::from(e));
            return Ok(());
        }

        debug!(
            id = %identifier,
            ext = %avatar.extension,
            waiters = pending.waiter_count(),
            "Completing avatar query"
        );
        pending.complete(&AvatarResponse::image(avatar.extension, avatar.bytes));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ImageExtension;
    use crate::domain::ports::AvatarStorePort;
    use crate::domain::ports::mocks::{FixedClock, MockAvatarStore, MockProfileSession};
    use chrono::Utc;
    use minidom::Element;

    const PNG_B64: &str = "iVBORw0KGgo=";
    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n";

    struct Harness {
        gateway: AvatarGateway,
        store: Arc<MockAvatarStore>,
        session: Arc<MockProfileSession>,
        clock: Arc<FixedClock>,
    }

    fn harness(config: GatewayConfig) -> Harness {
        let store = Arc::new(MockAvatarStore::new());
        let session = Arc::new(MockProfileSession::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let cache = Arc::new(AvatarCache::new(store.clone()));
        let gateway = AvatarGateway::new(cache, session.clone(), clock.clone(), config);
        Harness {
            gateway,
            store,
            session,
            clock,
        }
    }

    fn alice() -> UserIdentifier {
        UserIdentifier::new_unchecked("alice@example.org")
    }

    fn vcard(photo: &str) -> Element {
        format!("<vCard xmlns='vcard-temp'>{photo}</vCard>")
            .parse()
            .unwrap()
    }

    fn png_vcard() -> Element {
        vcard(&format!(
            "<PHOTO><TYPE>image/png</TYPE><BINVAL>{PNG_B64}</BINVAL></PHOTO>"
        ))
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_miss_queries_then_serves_png() {
        let h = harness(GatewayConfig::default());
        let (handle, rx) = ResponseHandle::channel();

        h.gateway.fetch(alice(), handle).await;
        assert_eq!(h.session.sent(), vec![(QueryId::from(43_u64), alice())]);

        h.gateway
            .on_reply(ProfileReply::profile(43_u64, Some(png_vcard())).with_from("alice@example.org"))
            .await
            .unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "image/png");
        assert_eq!(&response.body[..], PNG_BYTES);
        assert!(h.store.contains(&alice(), ImageExtension::Png));
        assert_eq!(h.gateway.cache().extension_of(&alice()), Some(ImageExtension::Png));
    }

    #[tokio::test]
    async fn test_remote_error_is_reported() {
        let h = harness(GatewayConfig::default());
        let (handle, rx) = ResponseHandle::channel();

        h.gateway.fetch(alice(), handle).await;
        h.gateway
            .on_reply(ProfileReply::error(43_u64, Some("item-not-found".to_string())))
            .await
            .unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.content_type, AvatarResponse::TEXT_PLAIN);
        assert_eq!(
            String::from_utf8_lossy(&response.body),
            "Error during query of this user’s vCard: “item-not-found”."
        );
        assert!(!h.gateway.cache().has(&alice()));
    }

    #[tokio::test]
    async fn test_fresh_hit_issues_no_query() {
        let h = harness(GatewayConfig::default());
        h.store
            .insert(&alice(), ImageExtension::Png, PNG_BYTES, h.clock.now());
        h.gateway.cache().rebuild().await.unwrap();

        let (handle, rx) = ResponseHandle::channel();
        h.gateway.fetch(alice(), handle).await;

        let response = rx.await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], PNG_BYTES);
        settle().await;
        assert_eq!(h.session.sent_count(), 0);
        assert!(h.store.contains(&alice(), ImageExtension::Png));
    }

    #[tokio::test]
    async fn test_stale_hit_serves_then_refreshes_once() {
        let h = harness(GatewayConfig::default());
        let old = h.clock.now() - chrono::Duration::hours(25);
        h.store.insert(&alice(), ImageExtension::Png, PNG_BYTES, old);
        h.gateway.cache().rebuild().await.unwrap();

        let (handle, rx) = ResponseHandle::channel();
        h.gateway.fetch(alice(), handle).await;
        let response = rx.await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], PNG_BYTES);

        settle().await;
        assert_eq!(h.session.sent_count(), 1);
        assert!(!h.gateway.cache().has(&alice()));
        assert!(!h.store.contains(&alice(), ImageExtension::Png));

        h.gateway
            .on_reply(ProfileReply::profile(43_u64, Some(png_vcard())))
            .await
            .unwrap();
        assert!(h.gateway.cache().has(&alice()));
        assert!(h.gateway.correlator().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_skips_fresh_entry() {
        let h = harness(GatewayConfig::default());
        h.store
            .insert(&alice(), ImageExtension::Png, PNG_BYTES, h.clock.now());
        h.gateway.cache().rebuild().await.unwrap();

        assert!(!h.gateway.refresh_if_stale(&alice()).await);
        h.clock.advance(chrono::Duration::hours(24) + chrono::Duration::seconds(1));
        assert!(h.gateway.refresh_if_stale(&alice()).await);
        assert!(!h.gateway.refresh_if_stale(&alice()).await);
        assert_eq!(h.session.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_type_leaves_cache_alone() {
        let h = harness(GatewayConfig::default());
        let (handle, rx) = ResponseHandle::channel();

        h.gateway.fetch(alice(), handle).await;
        let card = vcard("<PHOTO><TYPE>image/webp</TYPE><BINVAL>AAAA</BINVAL></PHOTO>");
        h.gateway
            .on_reply(ProfileReply::profile(43_u64, Some(card)))
            .await
            .unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(
            String::from_utf8_lossy(&response.body),
            "Error: this user’s avatar is in an unknown format."
        );
        assert!(h.gateway.cache().index().is_empty());
        assert_eq!(h.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_type_with_guess_policy() {
        let h = harness(GatewayConfig::default().with_mime_policy(MimePolicy::AssumePng));
        let (handle, rx) = ResponseHandle::channel();

        h.gateway.fetch(alice(), handle).await;
        let card = vcard(&format!("<PHOTO><BINVAL>{PNG_B64}</BINVAL></PHOTO>"));
        h.gateway
            .on_reply(ProfileReply::profile(43_u64, Some(card)))
            .await
            .unwrap();

        assert_eq!(rx.await.unwrap().content_type, "image/png");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_query_times_out() {
        let h = harness(GatewayConfig::default().with_reply_timeout(Duration::from_secs(5)));
        let (handle, rx) = ResponseHandle::channel();

        h.gateway.fetch(alice(), handle).await;
        let response = rx.await.unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(
            String::from_utf8_lossy(&response.body),
            "Error: timed out waiting for this user’s vCard."
        );
        assert!(h.gateway.correlator().is_empty());

        let late = h
            .gateway
            .on_reply(ProfileReply::profile(43_u64, Some(png_vcard())))
            .await;
        assert!(matches!(late, Err(CorrelatorError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_query() {
        let h = harness(GatewayConfig::default());
        let (first, rx1) = ResponseHandle::channel();
        let (second, rx2) = ResponseHandle::channel();

        h.gateway.fetch(alice(), first).await;
        h.gateway.fetch(alice(), second).await;
        assert_eq!(h.session.sent_count(), 1);

        h.gateway
            .on_reply(ProfileReply::profile(43_u64, Some(png_vcard())))
            .await
            .unwrap();

        assert_eq!(rx1.await.unwrap().status, 200);
        assert_eq!(rx2.await.unwrap().status, 200);
        assert_eq!(h.store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_completes_request() {
        let h = harness(GatewayConfig::default());
        h.session.set_fail_sends(true);
        let (handle, rx) = ResponseHandle::channel();

        h.gateway.fetch(alice(), handle).await;

        let response = rx.await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(
            String::from_utf8_lossy(&response.body),
            "Error: the XMPP session is unavailable."
        );
        assert!(h.gateway.correlator().is_empty());
    }

    #[tokio::test]
    async fn test_cache_write_failure_reports_cache_error() {
        let h = harness(GatewayConfig::default());
        h.store.set_fail_writes(true);
        let (handle, rx) = ResponseHandle::channel();

        h.gateway.fetch(alice(), handle).await;
        h.gateway
            .on_reply(ProfileReply::profile(43_u64, Some(png_vcard())))
            .await
            .unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response.status, 500);
        assert!(!h.gateway.cache().has(&alice()));
    }

    #[tokio::test]
    async fn test_unknown_reply_is_stray() {
        let h = harness(GatewayConfig::default());
        let result = h
            .gateway
            .on_reply(ProfileReply::profile(99_u64, Some(png_vcard())))
            .await;
        assert!(matches!(result, Err(CorrelatorError::NotFound(_))));
        assert!(h.gateway.cache().index().is_empty());
    }

    #[tokio::test]
    async fn test_vanished_file_falls_back_to_query() {
        let h = harness(GatewayConfig::default());
        h.store
            .insert(&alice(), ImageExtension::Png, PNG_BYTES, h.clock.now());
        h.gateway.cache().rebuild().await.unwrap();
        h.store.delete(&alice(), ImageExtension::Png).await.unwrap();

        let (handle, _rx) = ResponseHandle::channel();
        h.gateway.fetch(alice(), handle).await;

        assert!(!h.gateway.cache().has(&alice()));
        assert_eq!(h.session.sent_count(), 1);
    }
}
