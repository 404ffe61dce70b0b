//! RESP Protocol Types
//!
//! Command arguments arrive as an array of bulk strings and every hash command
//! answers with a [`RespValue`]. Framing and socket I/O belong to the server
//! embedding this crate.
//!
//! ## Example
//!
//! ```
//! use flashkv_hash::protocol::RespValue;
//! use bytes::Bytes;
//!
//! let reply = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(reply.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod types;

pub use types::RespValue;
