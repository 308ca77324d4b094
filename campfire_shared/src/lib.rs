//! `campfire_shared`
//!
//! Libraries shared by the client and its test harness.
//!
//! Design goals:
//! - Lenient, per-entity parsing of authoritative snapshots.
//! - Explicit, versionable wire messages.
//! - Traits at the rendering seam so the core stays backend-free.
//! - No `unsafe`.

pub mod config;
pub mod error;
pub mod event;
pub mod math;
pub mod protocol;
pub mod render;
pub mod snapshot;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::event::*;
    pub use crate::math::*;
    pub use crate::protocol::*;
    pub use crate::snapshot::*;
}
