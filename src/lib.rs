//! xavatar - serves XMPP vCard avatars over HTTP.
//!
//! An external XMPP component that answers `/avatar/<jid>` from an on-disk
//! cache, fetching missing or stale avatars over a persistent session.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the gateway, its services and DTOs.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing the XMPP, HTTP, disk and config adapters.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "xavatar";
