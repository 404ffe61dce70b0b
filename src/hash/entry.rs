//! Field entries and per-field expiry helpers.
//!
//! Expiry times are absolute unix milliseconds computed once at set time, so
//! repeated reads never drift. A field is expired as soon as `now >= expire_at`.

use bytes::Bytes;

/// A single field of a hash, as handed out by bulk reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEntry {
    /// Field name
    pub field: Bytes,
    /// Field value
    pub value: Bytes,
    /// Absolute expiry in unix milliseconds (None = no TTL)
    pub expire_at: Option<u64>,
}

impl FieldEntry {
    /// Checks if this entry has expired at `now`.
    #[inline]
    pub fn is_expired(&self, now: u64) -> bool {
        is_expired(self.expire_at, now)
    }
}

/// Result of writing a field into an encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The field did not exist before.
    Inserted,
    /// An existing field was overwritten.
    Updated,
}

/// Remaining lifetime of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTtl {
    /// The field does not exist (or already expired).
    Missing,
    /// The field exists without a TTL.
    Persistent,
    /// The field expires in this many milliseconds.
    ExpiresIn(u64),
}

/// Checks an optional expiry against the current time.
#[inline]
pub fn is_expired(expire_at: Option<u64>, now: u64) -> bool {
    expire_at.map(|exp| now >= exp).unwrap_or(false)
}

/// Converts a relative TTL in seconds into an absolute expiry.
#[inline]
pub fn expire_at_from_ttl(now: u64, ttl_secs: u64) -> u64 {
    now.saturating_add(ttl_secs.saturating_mul(1000))
}

/// Remaining lifetime of a live entry.
pub(crate) fn remaining(expire_at: Option<u64>, now: u64) -> FieldTtl {
    match expire_at {
        None => FieldTtl::Persistent,
        Some(exp) if now >= exp => FieldTtl::Missing,
        Some(exp) => FieldTtl::ExpiresIn(exp - now),
    }
}
