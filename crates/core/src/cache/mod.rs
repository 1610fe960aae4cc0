//! SQLite-backed partition store.
//!
//! This module provides the persistent storage behind the cache registry,
//! using SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Named partitions, each a bucket of request/response entries
//! - Hashed request identities as entry keys
//! - Automatic schema migrations
//! - Whole-partition deletion with cascading entry removal

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod partitions;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{NewEntry, StoredEntry, WriteFence};
