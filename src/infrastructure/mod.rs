//! Infrastructure layer with external service adapters.

/// On-disk avatar store.
pub mod cache;
/// Application configuration.
pub mod config;
/// HTTP front.
pub mod http;
/// XMPP component session.
pub mod xmpp;

pub use cache::DiskAvatarStore;
pub use config::{AppConfig, CliArgs, ConfigError, ConfigLoader, LogLevel};
pub use http::{avatar_router, serve};
pub use xmpp::{
    ComponentConnection, ConnectionState, ProtocolSession, ReplyHandler, SessionConfig,
    SessionEvent, SessionHandle,
};
