mod avatar_store_port;
mod clock_port;
mod profile_session_port;

pub use avatar_store_port::{AvatarStorePort, CacheError, CacheResult};
pub use clock_port::{ClockPort, SystemClock};
pub use profile_session_port::ProfileSessionPort;

#[cfg(test)]
pub mod mocks {
    pub use super::avatar_store_port::mock::MockAvatarStore;
    pub use super::clock_port::mock::FixedClock;
    pub use super::profile_session_port::mock::MockProfileSession;
}
