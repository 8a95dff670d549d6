//! Durable job store for the postvid pipeline.
//!
//! This crate provides:
//! - The `JobStore` trait with atomic conditional transitions
//! - A Redis implementation (hash per job, Lua scripts per transition)
//! - An in-memory implementation for tests and local runs
//! - Worker leases with renewal, expiry-based reclaim and expiry

pub mod config;
pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryJobStore;
pub use redis_store::RedisJobStore;
pub use store::JobStore;
