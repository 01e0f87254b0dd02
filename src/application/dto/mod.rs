//! Data transfer objects for the application layer.

mod profile_reply;

pub use profile_reply::{ProfileReply, ReplyOutcome};
