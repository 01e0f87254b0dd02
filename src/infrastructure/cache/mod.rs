//! Avatar persistence.

mod disk_store;

pub use disk_store::DiskAvatarStore;
