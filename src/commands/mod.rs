//! Command Handler Module
//!
//! Receives hash commands as RESP arrays, executes them against the storage
//! engine and returns the reply.
//!
//! ## Architecture
//!
//! ```text
//! Client Request (RESP array)
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  HashObject     │  (hash module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `HSET`, `HMSET`, `HSETNX`, `HSETEX`, `HDEL`
//! - `HGET`, `HMGET`, `HGETALL`, `HKEYS`, `HVALS`, `HLEN`, `HSTRLEN`, `HEXISTS`
//! - `HINCRBY`, `HINCRBYFLOAT`
//! - `HRANDFIELD`, `HSCAN`
//! - `FIELDTTL`, `FIELDEXPIRE`, `HPERSIST`
//! - `DEL`, `EXISTS`, `OBJECT ENCODING`

pub mod handler;

pub use handler::CommandHandler;
