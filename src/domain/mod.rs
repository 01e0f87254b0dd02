//! Domain layer with core entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{AvatarResponse, QueryId, ResponseHandle, UserIdentifier};
pub use errors::{AvatarError, DecodeError};
pub use ports::{AvatarStorePort, ClockPort, ProfileSessionPort};
