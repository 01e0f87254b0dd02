//! The persistent component session: connects, reconnects, routes inbound
//! stanzas to the gateway and drains the outbound queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use minidom::Element;
use parking_lot::RwLock;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, trace, warn};

use super::connection::StanzaConnection;
use super::constants::{MAX_RECONNECT_ATTEMPTS, OUTBOUND_QUEUE_SIZE, calculate_backoff_delay};
use super::stanza::{Inbound, courtesy_error, profile_query};
use super::state::ConnectionState;
use crate::application::dto::ProfileReply;
use crate::application::services::{CorrelatorError, run_guarded};
use crate::application::use_cases::AvatarGateway;
use crate::domain::entities::{QueryId, UserIdentifier};
use crate::domain::errors::{SessionError, SessionResult};
use crate::domain::ports::ProfileSessionPort;

/// Last id handed out before the first query; the first query id is 43.
const INITIAL_QUERY_COUNTER: u64 = 42;

pub struct SessionConfig {
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    #[must_use]
    pub const fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}

/// Lifecycle notifications, consumed by `main` for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected { reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    Error { message: String, recoverable: bool },
}

/// Receives replies that may answer one of our queries.
#[async_trait]
pub trait ReplyHandler: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the reply belongs to no pending query.
    async fn handle_reply(&self, reply: ProfileReply) -> Result<(), CorrelatorError>;
}

#[async_trait]
impl ReplyHandler for AvatarGateway {
    async fn handle_reply(&self, reply: ProfileReply) -> Result<(), CorrelatorError> {
        self.on_reply(reply).await
    }
}

/// Cheap, cloneable front of a [`ProtocolSession`].
#[derive(Clone)]
pub struct SessionHandle {
    jid: Arc<str>,
    counter: Arc<AtomicU64>,
    outbound: mpsc::Sender<Element>,
    state: Arc<RwLock<ConnectionState>>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl SessionHandle {
    #[must_use]
    pub fn jid(&self) -> &str {
        &self.jid
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Asks the session to close its stream and stop reconnecting.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    fn queue(&self, stanza: Element) -> SessionResult<()> {
        self.outbound.try_send(stanza).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::stream("outbound queue full"),
            TrySendError::Closed(_) => SessionError::ChannelClosed,
        })
    }
}

#[async_trait]
impl ProfileSessionPort for SessionHandle {
    fn next_query_id(&self) -> QueryId {
        QueryId::from(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn send_profile_query(&self, id: &QueryId, to: &UserIdentifier) -> SessionResult<()> {
        if !self.is_running() {
            return Err(SessionError::ChannelClosed);
        }
        self.queue(profile_query(id, &self.jid, to))
    }
}

pub struct ProtocolSession {
    connection: Box<dyn StanzaConnection>,
    config: SessionConfig,
    handle: SessionHandle,
    outbound_rx: mpsc::Receiver<Element>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl ProtocolSession {
    #[must_use]
    pub fn new(connection: Box<dyn StanzaConnection>, config: SessionConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let handle = SessionHandle {
            jid: Arc::from(connection.jid()),
            counter: Arc::new(AtomicU64::new(INITIAL_QUERY_COUNTER)),
            outbound: outbound_tx,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            running: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(Notify::new()),
        };

        Self {
            connection,
            config,
            handle,
            outbound_rx,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Takes the lifecycle event stream. Only the first call returns it.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.event_rx.take()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.handle.state.write(), state);
        if previous != state {
            debug!(from = %previous, to = %state, "Session state changed");
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Runs until [`SessionHandle::shutdown`] or an unrecoverable error.
    ///
    /// # Errors
    ///
    /// Returns the error that made the session give up.
    pub async fn run(mut self, handler: Arc<dyn ReplyHandler>) -> SessionResult<()> {
        let mut attempts: u32 = 0;

        let result = loop {
            if !self.handle.is_running() {
                break Ok(());
            }

            self.set_state(ConnectionState::Connecting);
            let error = match self.connection.connect().await {
                Ok(()) => {
                    attempts = 0;
                    self.set_state(ConnectionState::Connected);
                    info!(jid = %self.handle.jid, "XMPP session established");
                    self.emit(SessionEvent::Connected);

                    let result = self.run_connected(&handler).await;
                    self.connection.disconnect().await;

                    match result {
                        Ok(()) => break Ok(()),
                        Err(e) => {
                            warn!(error = %e, "XMPP session lost");
                            self.emit(SessionEvent::Disconnected {
                                reason: e.to_string(),
                            });
                            e
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to connect to XMPP server");
                    self.emit(SessionEvent::Error {
                        message: e.to_string(),
                        recoverable: e.should_reconnect(),
                    });
                    e
                }
            };

            if !error.should_reconnect() || !self.config.auto_reconnect {
                break Err(error);
            }

            attempts += 1;
            if attempts > self.config.max_reconnect_attempts {
                error!(attempts = attempts - 1, "Max reconnection attempts exceeded");
                self.emit(SessionEvent::Error {
                    message: format!(
                        "Max reconnection attempts ({}) exceeded",
                        self.config.max_reconnect_attempts
                    ),
                    recoverable: false,
                });
                break Err(error);
            }

            let delay = calculate_backoff_delay(attempts);
            info!(
                attempt = attempts,
                delay_ms = delay.as_millis(),
                "Reconnecting to XMPP server"
            );
            self.set_state(ConnectionState::Reconnecting { attempt: attempts });
            self.emit(SessionEvent::Reconnecting {
                attempt: attempts,
                delay,
            });

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.handle.shutdown.notified() => {}
            }
        };

        self.handle.running.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
        info!("XMPP session terminated");
        result
    }

    async fn run_connected(&mut self, handler: &Arc<dyn ReplyHandler>) -> SessionResult<()> {
        loop {
            tokio::select! {
                () = self.handle.shutdown.notified() => {
                    self.set_state(ConnectionState::ShuttingDown);
                    return Ok(());
                }

                received = self.connection.receive() => {
                    let stanza = received?;
                    trace!(name = %stanza.name(), "Stanza received");
                    self.dispatch(stanza, handler);
                }

                Some(stanza) = self.outbound_rx.recv() => {
                    trace!(name = %stanza.name(), id = ?stanza.attr("id"), "Sending stanza");
                    self.connection.send(stanza).await?;
                }
            }
        }
    }

    fn dispatch(&self, stanza: Element, handler: &Arc<dyn ReplyHandler>) {
        let handler = Arc::clone(handler);
        let handle = self.handle.clone();
        tokio::spawn(run_guarded("stanza dispatch", async move {
            handle_inbound(stanza, handler.as_ref(), &handle).await;
        }));
    }
}

async fn handle_inbound(stanza: Element, handler: &dyn ReplyHandler, handle: &SessionHandle) {
    let header = match Inbound::classify(stanza) {
        Inbound::Reply(header, reply) => {
            let query_id = reply.query_id.clone();
            match handler.handle_reply(reply).await {
                Ok(()) => {
                    debug!(query_id = %query_id, "Reply delivered");
                    return;
                }
                Err(e) => {
                    debug!(query_id = %query_id, error = %e, "Reply matches no pending query");
                    header
                }
            }
        }
        Inbound::Stray(header) => header,
    };

    debug!(
        stanza = %header.name,
        from = ?header.from,
        id = ?header.id,
        "Stray stanza"
    );

    if let Some(reply) = courtesy_error(&header)
        && let Err(e) = handle.queue(reply)
    {
        warn!(error = %e, "Failed to queue courtesy error");
    }
}
