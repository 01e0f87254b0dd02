//! HTTP front: `/avatar/<identifier>` and `/health`.

mod router;

pub use router::{avatar_router, serve};
