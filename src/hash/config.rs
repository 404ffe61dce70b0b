//! Hash object configuration.

/// Tuning knobs for hash objects.
///
/// These come from the surrounding server configuration; a `HashObject`
/// copies them at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashConfig {
    /// Maximum number of fields a compact hash may hold (default: 128).
    /// Zero makes every new hash start in the expanded encoding.
    pub max_compact_entries: usize,

    /// Maximum byte length of a field name or value in a compact hash (default: 64)
    pub max_compact_value: usize,

    /// Non-empty buckets migrated per operation while the table resizes (default: 1)
    pub rehash_buckets_per_step: usize,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            max_compact_entries: 128,
            max_compact_value: 64,
            rehash_buckets_per_step: 1,
        }
    }
}

impl HashConfig {
    /// Returns true if an entry of this shape forces the expanded encoding.
    #[inline]
    pub(crate) fn exceeds_compact_value(&self, field_len: usize, value_len: usize) -> bool {
        field_len > self.max_compact_value || value_len > self.max_compact_value
    }
}
