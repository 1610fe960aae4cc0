//! Worker runtime for tidecache.
//!
//! Hosts the cache registry, router, executors and retry queue behind a
//! line-delimited JSON protocol on stdio.

pub mod error;
pub mod handler;
pub mod handlers;
pub mod protocol;
pub mod stdio;

pub use error::ProtocolError;
pub use handler::{FetchDecision, Worker};
pub use protocol::{HostEvent, HostReply, Inbound, Outbound};
