//! Core types and shared functionality for tidecache.
//!
//! This crate provides:
//! - HTTP value types shared by the router, executors and worker runtime
//! - Partition store with SQLite backend
//! - The cache registry that owns every partition
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod registry;

pub use cache::CacheDb;
pub use config::AppConfig;
pub use error::Error;
pub use http::{Headers, Request, RequestMode, Response};
pub use registry::{CacheRegistry, CachedEntry, PartitionHandle, PartitionRole, RequestIdentity};
