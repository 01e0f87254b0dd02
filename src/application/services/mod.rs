pub mod avatar_cache;
pub mod avatar_decoder;
pub mod correlator;
pub mod task_guard;

pub use avatar_cache::{AvatarCache, CacheIndex};
pub use avatar_decoder::{MimePolicy, VCARD_NS, decode_avatar};
pub use correlator::{Correlator, CorrelatorError, PendingQuery, Registration};
pub use task_guard::{panic_message, run_guarded};
