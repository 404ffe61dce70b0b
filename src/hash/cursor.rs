//! Reverse-binary scan cursor.
//!
//! A scan cursor is a bucket index whose bits are incremented from the most
//! significant end instead of the least significant one. For a table of 8
//! buckets the visiting order is `0 4 2 6 1 5 3 7`.
//!
//! Because tables only ever grow or shrink by powers of two, a bucket `b` in a
//! table with mask `m` holds exactly the entries of buckets `b`, `b | (m+1)`,
//! ... of a larger table. Incrementing the high bits first means every bucket
//! already visited before a resize maps onto buckets that are also "behind" the
//! cursor after the resize, so no entry present for the whole scan is missed.
//! Shrinking may revisit some entries, which callers must tolerate.
//!
//! These functions know nothing about tables or entries.

/// Advances a cursor for a table with the given size mask.
///
/// Returns 0 once every bucket of the table has been visited.
#[inline]
pub fn next_cursor(cursor: u64, mask: u64) -> u64 {
    // Set the bits above the mask so the increment carries straight out of them.
    let v = cursor | !mask;
    v.reverse_bits().wrapping_add(1).reverse_bits()
}

/// Advances a cursor by the bits covered by `large_mask` but not `small_mask`.
///
/// Used while two table generations coexist: after visiting bucket
/// `cursor & small_mask` of the small table, the caller visits every bucket of
/// the large table that expands it, stepping with this function until it
/// returns false.
#[inline]
pub fn next_expansion(cursor: u64, small_mask: u64, large_mask: u64) -> (u64, bool) {
    let next = next_cursor(cursor, large_mask);
    (next, next & (small_mask ^ large_mask) != 0)
}
