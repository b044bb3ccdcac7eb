//! Obra Lock - distributed lock client for the obra back office
//!
//! This crate provides:
//! - A lock client that acquires named, TTL-bounded locks from the lock service
//!   with bounded retry on contention
//! - Scoped critical sections (`with_lock`) that always release what they acquired
//! - A local registry with defensive TTL expiry and bulk cleanup
//! - Local-fallback mode, observable through `LockClient::mode`, for
//!   deployments without the lock routes
//! - Scope-bound handles that release in the background when dropped
//! - An in-memory lock service implementing the same transport

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod handle;
pub mod memory;
pub mod model;
mod registry;
pub mod resource;
pub mod stats;
pub mod transport;

pub use client::LockClient;
pub use config::LockClientConfig;
pub use error::LockError;
pub use handle::ResourceLock;
pub use memory::MemoryLockTransport;
pub use model::{AcquireOptions, AcquireOutcome, LockMode};
pub use stats::LockStats;
pub use transport::{HttpLockTransport, LockTransport};
