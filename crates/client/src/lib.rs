//! Client-side request handling for tidecache.
//!
//! This crate provides the network seam, the request router, the strategy
//! executors and the mutation retry queue shared by the worker runtime.

pub mod fetch;
pub mod queue;
pub mod router;
pub mod strategy;

pub use fetch::{FetchConfig, HttpNetwork, Network, resolve};
#[cfg(any(test, feature = "test-util"))]
pub use fetch::MemoryNetwork;
pub use queue::{QueuedMutation, ReplayReport, RetryQueue};
pub use router::{Matcher, Route, Router, RoutingRule, RuleAction, default_rules};
pub use strategy::{ExecOptions, Executor, Fallback, Handled, ResponseSource, Revalidation, Strategy};
