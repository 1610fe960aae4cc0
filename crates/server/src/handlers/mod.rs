//! Event handlers, one module per event family.
//!
//! Each module adds methods to [`crate::handler::Worker`].

pub mod control;
pub mod lifecycle;
pub mod push;
pub mod sync;
