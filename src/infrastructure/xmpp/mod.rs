//! XMPP component session (XEP-0114).

mod connection;
mod constants;
mod session;
mod stanza;
mod state;

pub use connection::{ComponentConnection, StanzaConnection};
pub use constants::{NS_COMPONENT, NS_STANZAS, calculate_backoff_delay};
pub use session::{ProtocolSession, ReplyHandler, SessionConfig, SessionEvent, SessionHandle};
pub use stanza::{Inbound, StanzaHeader, courtesy_error, error_condition, profile_query};
pub use state::ConnectionState;
