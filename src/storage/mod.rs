//! Storage Engine Module
//!
//! The keyspace that owns every hash object, plus the background task that
//! reclaims expired fields nobody reads anymore.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │            │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ active_expire_cycle(fields, keys)
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use flashkv_hash::storage::StorageEngine;
//! use bytes::Bytes;
//!
//! let engine = StorageEngine::new();
//!
//! engine.hset(
//!     Bytes::from("user:1"),
//!     vec![(Bytes::from("visits"), Bytes::from("1"))],
//! );
//! assert_eq!(engine.hincrby(Bytes::from("user:1"), Bytes::from("visits"), 2), Ok(3));
//!
//! // Field that expires in an hour
//! engine.hsetex(
//!     Bytes::from("user:1"),
//!     vec![(Bytes::from("session"), Bytes::from("token123"))],
//!     3600,
//!     false,
//! );
//! assert_eq!(engine.hlen(b"user:1"), 2);
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{ActiveExpireStats, StorageEngine, StorageStats};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
