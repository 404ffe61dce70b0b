//! # FlashKV Hash - Hash Fields for FlashKV
//!
//! The hash data type of FlashKV: a per-key map from field names to values,
//! where every field may carry its own expiry time.
//!
//! ## Features
//!
//! - **Two Encodings**: small hashes live in one packed byte buffer, large
//!   ones in a chained hash table; promotion is one-way and automatic
//! - **Incremental Rehashing**: table resizes are spread over later
//!   operations, so no single call pays for a full rehash
//! - **Field TTLs**: lazy expiry on access plus a background sweeper
//! - **Resumable Scans**: HSCAN cursors survive table growth and shrinking
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            FlashKV Hash                                 │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │  Command    │───>│              StorageEngine                   │    │
//! │  │  Handler    │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │    │
//! │  └─────────────┘    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │    │
//! │                     │  └───┬────┘ └────────┘ └────────┘ └────────┘ │    │
//! │                     └──────┼───────────────────────────────────────┘    │
//! │                            ▼                    ▲                       │
//! │                   ┌─────────────────┐           │ active expiry         │
//! │                   │   HashObject    │   ┌───────┴─────────┐             │
//! │                   │ Listpack | Dict │   │  ExpirySweeper  │             │
//! │                   └─────────────────┘   └─────────────────┘             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use flashkv_hash::commands::CommandHandler;
//! use flashkv_hash::protocol::RespValue;
//! use flashkv_hash::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let handler = CommandHandler::new(Arc::new(StorageEngine::new()));
//!
//! let command = |args: &[&str]| {
//!     RespValue::array(args.iter().map(|a| RespValue::bulk_string(Bytes::from(a.to_string()))).collect())
//! };
//!
//! assert_eq!(handler.execute(command(&["HSET", "user:1", "name", "Ariz"])), RespValue::integer(1));
//! assert_eq!(
//!     handler.execute(command(&["HGET", "user:1", "name"])),
//!     RespValue::bulk_string(Bytes::from("Ariz"))
//! );
//! ```
//!
//! ## Module Overview
//!
//! - [`hash`]: the hash object and its two encodings
//! - [`storage`]: sharded keyspace and the background expiry sweeper
//! - [`commands`]: the `H*` command handlers
//! - [`protocol`]: RESP reply values
//! - [`clock`]: time sources for field expiry
//! - [`error`]: errors raised by numeric increments
//!
//! ## Lazy + Active Expiry
//!
//! Fields with a TTL are expired in two ways:
//! 1. **Lazy**: any operation that finds an expired field removes it
//! 2. **Active**: a background task reclaims a bounded number of expired
//!    fields per cycle, so fields nobody reads still free their memory

pub mod clock;
pub mod commands;
pub mod error;
pub mod hash;
pub mod protocol;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::CommandHandler;
pub use error::{HashError, HashResult};
pub use hash::{EncodingKind, FieldTtl, HashConfig, HashObject};
pub use protocol::RespValue;
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
