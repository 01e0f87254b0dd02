//! Domain error types.

mod avatar_error;
mod decode_error;
mod identifier_error;
mod session_error;

pub use avatar_error::AvatarError;
pub use decode_error::DecodeError;
pub use identifier_error::IdentifierError;
pub use session_error::{SessionError, SessionResult};
