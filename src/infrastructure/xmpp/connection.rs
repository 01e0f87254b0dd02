use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use minidom::Element;
use tokio::time::timeout;
use tokio_xmpp::Component;
use tracing::debug;
use zeroize::Zeroizing;

use super::constants::CONNECTION_TIMEOUT;
use crate::domain::errors::{SessionError, SessionResult};

/// A stanza-level connection to the XMPP server.
#[async_trait]
pub trait StanzaConnection: Send {
    async fn connect(&mut self) -> SessionResult<()>;
    async fn disconnect(&mut self);
    async fn send(&mut self, stanza: Element) -> SessionResult<()>;
    async fn receive(&mut self) -> SessionResult<Element>;
    /// Address stamped on outbound stanzas.
    fn jid(&self) -> &str;
    fn is_connected(&self) -> bool;
}

/// XEP-0114 component connection.
pub struct ComponentConnection {
    jid: String,
    password: Zeroizing<String>,
    host: String,
    port: u16,
    component: Option<Component>,
}

impl ComponentConnection {
    #[must_use]
    pub fn new(
        jid: impl Into<String>,
        password: Zeroizing<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            jid: jid.into(),
            password,
            host: host.into(),
            port,
            component: None,
        }
    }
}

fn map_xmpp_error(e: tokio_xmpp::Error) -> SessionError {
    match e {
        tokio_xmpp::Error::Auth(e) => SessionError::auth_failed(e.to_string()),
        tokio_xmpp::Error::Io(e) => SessionError::Io(e),
        other => SessionError::connection_failed(other.to_string()),
    }
}

#[async_trait]
impl StanzaConnection for ComponentConnection {
    async fn connect(&mut self) -> SessionResult<()> {
        if self.component.is_some() {
            return Err(SessionError::AlreadyConnected);
        }

        let connect = Component::new(&self.jid, &self.password, &self.host, self.port);
        let component = timeout(CONNECTION_TIMEOUT, connect)
            .await
            .map_err(|_| SessionError::timeout("component handshake"))?
            .map_err(map_xmpp_error)?;

        debug!(jid = %self.jid, host = %self.host, port = self.port, "Component stream open");
        self.component = Some(component);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut component) = self.component.take() {
            let _ = component.close().await;
            debug!("Component stream closed");
        }
    }

    async fn send(&mut self, stanza: Element) -> SessionResult<()> {
        let component = self.component.as_mut().ok_or(SessionError::NotConnected)?;
        component
            .send_stanza(stanza)
            .await
            .map_err(|e| SessionError::stream(e.to_string()))
    }

    async fn receive(&mut self) -> SessionResult<Element> {
        let component = self.component.as_mut().ok_or(SessionError::NotConnected)?;
        match component.next().await {
            Some(stanza) => Ok(stanza),
            None => {
                self.component = None;
                Err(SessionError::closed("stream ended"))
            }
        }
    }

    fn jid(&self) -> &str {
        &self.jid
    }

    fn is_connected(&self) -> bool {
        self.component.is_some()
    }
}
