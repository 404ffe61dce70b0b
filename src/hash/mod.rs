//! Hash Module
//!
//! The per-key field container behind the `H*` commands.
//!
//! ## Layout
//!
//! - [`object::HashObject`]: the facade callers use; picks the encoding and
//!   applies field expiry
//! - [`listpack::Listpack`]: compact encoding for small hashes
//! - [`dict::Dict`]: expanded encoding with incremental rehashing
//! - [`cursor`]: reverse-binary scan cursor arithmetic
//! - [`pattern::GlobPattern`]: MATCH filter for HSCAN
//! - [`numeric`]: strict number parsing for HINCRBY / HINCRBYFLOAT

pub mod config;
pub mod cursor;
pub mod dict;
pub mod entry;
pub mod listpack;
pub mod numeric;
pub mod object;
pub mod pattern;

pub use config::HashConfig;
pub use entry::{FieldEntry, FieldTtl, SetOutcome};
pub use object::{EncodingKind, HashObject, Lookup, ScanResult};
pub use pattern::GlobPattern;
