//! Domain entity definitions.

mod avatar;
mod identifier;
mod query;

pub use avatar::{
    CacheEntry, DecodedAvatar, ImageExtension, cache_file_name, parse_cache_file_name,
};
pub use identifier::UserIdentifier;
pub use query::{AvatarResponse, QueryId, ResponseHandle, Waiter};
