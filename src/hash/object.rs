//! Hash Object
//!
//! The value stored under a hash key. It owns exactly one encoding at a time
//! and exposes the uniform operation set used by the command layer:
//!
//! ```text
//!            ┌──────────────────────────┐
//!   HSET ───>│        HashObject        │
//!   HGET ───>│  expiry check on access  │
//!   HSCAN ──>│  promotion after writes  │
//!            └────────────┬─────────────┘
//!                         │
//!         ┌───────────────┴────────────────┐
//!         ▼                                ▼
//!   ┌───────────┐    one-way promotion  ┌───────────┐
//!   │ Listpack  │ ────────────────────> │   Dict    │
//!   │ (compact) │                       │ (expanded)│
//!   └───────────┘                       └───────────┘
//! ```
//!
//! Every operation takes `now` (unix milliseconds). A field whose expiry is at
//! or before `now` is treated as absent and physically removed by whichever
//! operation finds it. Callers drop the key once [`HashObject::is_empty`]
//! returns true after an operation.

use crate::error::{HashError, HashResult};
use crate::hash::config::HashConfig;
use crate::hash::dict::Dict;
use crate::hash::entry::{
    expire_at_from_ttl, is_expired, remaining, FieldEntry, FieldTtl, SetOutcome,
};
use crate::hash::listpack::Listpack;
use crate::hash::numeric::{format_f64, format_i64, parse_f64, parse_i64};
use crate::hash::pattern::GlobPattern;
use bytes::Bytes;
use rand::seq::index;
use rand::Rng;
use std::collections::HashSet;
use std::mem;
use tracing::debug;

/// Which physical encoding a hash currently uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingKind {
    Compact,
    Expanded,
}

impl EncodingKind {
    /// Name reported by `OBJECT ENCODING`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingKind::Compact => "listpack",
            EncodingKind::Expanded => "hashtable",
        }
    }
}

#[derive(Debug)]
enum Encoding {
    Compact(Listpack),
    Expanded(Dict),
}

/// Result of a non-mutating field lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// The field does not exist.
    Missing,
    /// The field exists but its TTL has passed; it still needs to be removed.
    Expired,
    /// The field is live.
    Live {
        value: &'a [u8],
        expire_at: Option<u64>,
    },
}

/// One page of an HSCAN.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Cursor for the next call; 0 when the scan is complete
    pub cursor: u64,
    /// (field, value) pairs found in this page
    pub entries: Vec<(Bytes, Bytes)>,
}

/// A hash value: field names mapped to values with optional per-field TTLs.
#[derive(Debug)]
pub struct HashObject {
    encoding: Encoding,
    config: HashConfig,
}

impl HashObject {
    /// Creates an empty hash.
    pub fn new(config: HashConfig) -> Self {
        let encoding = if config.max_compact_entries == 0 {
            Encoding::Expanded(Dict::new(config.rehash_buckets_per_step))
        } else {
            Encoding::Compact(Listpack::new())
        };
        Self { encoding, config }
    }

    pub fn encoding(&self) -> EncodingKind {
        match self.encoding {
            Encoding::Compact(_) => EncodingKind::Compact,
            Encoding::Expanded(_) => EncodingKind::Expanded,
        }
    }

    /// Number of stored fields, including expired ones not reclaimed yet.
    pub fn stored_len(&self) -> usize {
        match &self.encoding {
            Encoding::Compact(lp) => lp.len(),
            Encoding::Expanded(dict) => dict.len(),
        }
    }

    /// True when nothing is stored; the key should then be removed.
    pub fn is_empty(&self) -> bool {
        self.stored_len() == 0
    }

    /// Number of live fields. Reclaims expired fields first.
    pub fn len(&mut self, now: u64) -> usize {
        self.expire_all(now);
        self.stored_len()
    }

    /// Approximate memory footprint in bytes.
    pub fn memory_usage(&self) -> usize {
        let payload = match &self.encoding {
            Encoding::Compact(lp) => lp.bytes(),
            Encoding::Expanded(dict) => dict.memory_usage(),
        };
        payload + mem::size_of::<Self>()
    }

    /// Looks a field up without modifying anything.
    pub fn lookup(&self, field: &[u8], now: u64) -> Lookup<'_> {
        let (value, expire_at) = match &self.encoding {
            Encoding::Compact(lp) => match lp.get(field) {
                Some(entry) => (entry.value, entry.expire_at),
                None => return Lookup::Missing,
            },
            Encoding::Expanded(dict) => match dict.get(field) {
                Some(entry) => (&entry.value[..], entry.expire_at),
                None => return Lookup::Missing,
            },
        };

        if is_expired(expire_at, now) {
            Lookup::Expired
        } else {
            Lookup::Live { value, expire_at }
        }
    }

    /// Removes `field` if it exists and has expired.
    pub fn purge_if_expired(&mut self, field: &[u8], now: u64) -> bool {
        match self.lookup(field, now) {
            Lookup::Expired => self.remove_raw(field),
            _ => false,
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// HSET for one field. Clears any TTL the field had.
    ///
    /// Returns true if the field was created.
    pub fn set(&mut self, field: Bytes, value: Bytes, now: u64) -> bool {
        self.set_field(field, value, None, false, now)
    }

    /// HSET for several fields. Returns how many were created.
    pub fn set_many(&mut self, pairs: impl IntoIterator<Item = (Bytes, Bytes)>, now: u64) -> usize {
        pairs
            .into_iter()
            .filter(|(field, value)| self.set_field(field.clone(), value.clone(), None, false, now))
            .count()
    }

    /// HSETNX: sets the field only if it is absent.
    pub fn set_nx(&mut self, field: Bytes, value: Bytes, now: u64) -> bool {
        self.set_field(field, value, None, true, now)
    }

    /// Sets a field that expires `ttl_secs` seconds from `now`.
    pub fn set_with_ttl(&mut self, field: Bytes, value: Bytes, ttl_secs: u64, now: u64) -> bool {
        let expire_at = expire_at_from_ttl(now, ttl_secs);
        self.set_field(field, value, Some(expire_at), false, now)
    }

    /// Like [`set_with_ttl`](Self::set_with_ttl) but leaves live fields alone.
    pub fn set_with_ttl_nx(&mut self, field: Bytes, value: Bytes, ttl_secs: u64, now: u64) -> bool {
        let expire_at = expire_at_from_ttl(now, ttl_secs);
        self.set_field(field, value, Some(expire_at), true, now)
    }

    fn set_field(
        &mut self,
        field: Bytes,
        value: Bytes,
        expire_at: Option<u64>,
        only_if_absent: bool,
        now: u64,
    ) -> bool {
        // An expired field is replaced as if it never existed.
        self.purge_if_expired(&field, now);
        if only_if_absent && !matches!(self.lookup(&field, now), Lookup::Missing) {
            return false;
        }
        self.write_raw(field, value, expire_at) == SetOutcome::Inserted
    }

    /// Writes without any expiry check, then promotes if a threshold was crossed.
    fn write_raw(&mut self, field: Bytes, value: Bytes, expire_at: Option<u64>) -> SetOutcome {
        let (field_len, value_len) = (field.len(), value.len());
        let outcome = match &mut self.encoding {
            Encoding::Compact(lp) => lp.set(&field, &value, expire_at),
            Encoding::Expanded(dict) => dict.insert(field, value, expire_at),
        };
        self.promote_if_needed(field_len, value_len);
        outcome
    }

    fn promote_if_needed(&mut self, field_len: usize, value_len: usize) {
        let Encoding::Compact(lp) = &self.encoding else {
            return;
        };
        if lp.len() <= self.config.max_compact_entries
            && !self.config.exceeds_compact_value(field_len, value_len)
        {
            return;
        }

        let mut dict = Dict::with_capacity(lp.len(), self.config.rehash_buckets_per_step);
        for entry in lp.iter() {
            dict.insert(
                Bytes::copy_from_slice(entry.field),
                Bytes::copy_from_slice(entry.value),
                entry.expire_at,
            );
        }
        debug!(
            fields = dict.len(),
            field_len, value_len, "hash promoted from listpack to hashtable"
        );
        self.encoding = Encoding::Expanded(dict);
    }

    fn remove_raw(&mut self, field: &[u8]) -> bool {
        match &mut self.encoding {
            Encoding::Compact(lp) => lp.remove(field),
            Encoding::Expanded(dict) => dict.remove(field).is_some(),
        }
    }

    fn rehash_step(&mut self) {
        if let Encoding::Expanded(dict) = &mut self.encoding {
            dict.rehash_step();
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Reads a live field through `read`, reclaiming it if it has expired.
    fn read_live<T>(
        &mut self,
        field: &[u8],
        now: u64,
        read: impl FnOnce(&[u8], Option<u64>) -> T,
    ) -> Option<T> {
        self.rehash_step();
        match self.lookup(field, now) {
            Lookup::Live { value, expire_at } => return Some(read(value, expire_at)),
            Lookup::Missing => return None,
            Lookup::Expired => {}
        }
        self.remove_raw(field);
        None
    }

    pub fn get(&mut self, field: &[u8], now: u64) -> Option<Bytes> {
        self.read_live(field, now, |value, _| Bytes::copy_from_slice(value))
    }

    /// HMGET: one result per requested field, in order.
    pub fn get_many(&mut self, fields: &[Bytes], now: u64) -> Vec<Option<Bytes>> {
        fields.iter().map(|field| self.get(field, now)).collect()
    }

    /// HSTRLEN: byte length of the value, 0 if absent.
    pub fn strlen(&mut self, field: &[u8], now: u64) -> usize {
        self.read_live(field, now, |value, _| value.len())
            .unwrap_or(0)
    }

    pub fn exists(&mut self, field: &[u8], now: u64) -> bool {
        self.read_live(field, now, |_, _| ()).is_some()
    }

    /// All live fields with their expiry.
    pub fn entries(&mut self, now: u64) -> Vec<FieldEntry> {
        self.expire_all(now);
        match &self.encoding {
            Encoding::Compact(lp) => lp
                .iter()
                .map(|e| FieldEntry {
                    field: Bytes::copy_from_slice(e.field),
                    value: Bytes::copy_from_slice(e.value),
                    expire_at: e.expire_at,
                })
                .collect(),
            Encoding::Expanded(dict) => dict
                .iter()
                .map(|e| FieldEntry {
                    field: e.field.clone(),
                    value: e.value.clone(),
                    expire_at: e.expire_at,
                })
                .collect(),
        }
    }

    /// HGETALL
    pub fn get_all(&mut self, now: u64) -> Vec<(Bytes, Bytes)> {
        self.entries(now)
            .into_iter()
            .map(|e| (e.field, e.value))
            .collect()
    }

    /// HKEYS
    pub fn keys(&mut self, now: u64) -> Vec<Bytes> {
        self.entries(now).into_iter().map(|e| e.field).collect()
    }

    /// HVALS
    pub fn values(&mut self, now: u64) -> Vec<Bytes> {
        self.entries(now).into_iter().map(|e| e.value).collect()
    }

    // ========================================================================
    // Deletes
    // ========================================================================

    /// HDEL for one field. An expired field counts as already gone.
    pub fn delete(&mut self, field: &[u8], now: u64) -> bool {
        if self.purge_if_expired(field, now) {
            return false;
        }
        self.remove_raw(field)
    }

    /// HDEL for several fields. Returns how many were removed.
    pub fn delete_many(&mut self, fields: &[Bytes], now: u64) -> usize {
        fields
            .iter()
            .filter(|field| self.delete(field, now))
            .count()
    }

    // ========================================================================
    // Increments
    // ========================================================================

    /// HINCRBY. A missing field counts as 0; an existing TTL is kept.
    pub fn incr_by(&mut self, field: Bytes, delta: i64, now: u64) -> HashResult<i64> {
        let found = self.read_live(&field, now, |value, expire_at| {
            parse_i64(value).map(|n| (n, expire_at))
        });
        let (current, expire_at) = match found {
            Some(Some(parsed)) => parsed,
            Some(None) => return Err(HashError::NotAnInteger),
            None => (0, None),
        };

        let next = current
            .checked_add(delta)
            .ok_or(HashError::IncrementOverflow)?;
        self.write_raw(field, format_i64(next), expire_at);
        Ok(next)
    }

    /// HINCRBYFLOAT. Returns the stored representation of the result.
    pub fn incr_by_float(&mut self, field: Bytes, delta: f64, now: u64) -> HashResult<Bytes> {
        let found = self.read_live(&field, now, |value, expire_at| {
            parse_f64(value).map(|n| (n, expire_at))
        });
        let (current, expire_at) = match found {
            Some(Some(parsed)) => parsed,
            Some(None) => return Err(HashError::NotAFloat),
            None => (0.0, None),
        };

        let next = current + delta;
        if !next.is_finite() {
            return Err(HashError::NonFiniteResult);
        }
        let formatted = format_f64(next);
        self.write_raw(field, formatted.clone(), expire_at);
        Ok(formatted)
    }

    // ========================================================================
    // Random selection
    // ========================================================================

    /// HRANDFIELD without a count: one live field, uniformly chosen.
    pub fn rand_field<R: Rng>(&mut self, rng: &mut R, now: u64) -> Option<Bytes> {
        self.expire_all(now);
        self.random_pair(rng).map(|(field, _)| field)
    }

    /// HRANDFIELD with a count.
    ///
    /// A positive count returns up to `count` distinct fields. A negative
    /// count returns exactly `|count|` fields drawn with replacement.
    pub fn rand_fields<R: Rng>(&mut self, count: i64, rng: &mut R, now: u64) -> Vec<(Bytes, Bytes)> {
        self.expire_all(now);
        let len = self.stored_len();
        if count == 0 || len == 0 {
            return Vec::new();
        }

        if count < 0 {
            let picks = usize::try_from(count.unsigned_abs()).unwrap_or(usize::MAX);
            return (0..picks).filter_map(|_| self.random_pair(rng)).collect();
        }

        let wanted = usize::try_from(count).unwrap_or(usize::MAX);
        if wanted >= len {
            return self.get_all(now);
        }

        match &self.encoding {
            Encoding::Compact(lp) => pick_ranks(
                lp.iter()
                    .map(|e| (Bytes::copy_from_slice(e.field), Bytes::copy_from_slice(e.value))),
                len,
                wanted,
                rng,
            ),
            // Asking for most of the table: one pass over chosen ranks.
            Encoding::Expanded(dict) if wanted * 3 > len => pick_ranks(
                dict.iter().map(|e| (e.field.clone(), e.value.clone())),
                len,
                wanted,
                rng,
            ),
            // Asking for few: random draws until enough distinct fields.
            Encoding::Expanded(dict) => {
                let mut seen = HashSet::with_capacity(wanted);
                let mut picked = Vec::with_capacity(wanted);
                while picked.len() < wanted {
                    if let Some(entry) = dict.random_entry(rng) {
                        if seen.insert(entry.field.clone()) {
                            picked.push((entry.field.clone(), entry.value.clone()));
                        }
                    }
                }
                picked
            }
        }
    }

    fn random_pair<R: Rng>(&self, rng: &mut R) -> Option<(Bytes, Bytes)> {
        match &self.encoding {
            Encoding::Compact(lp) => {
                if lp.is_empty() {
                    return None;
                }
                lp.nth(rng.random_range(0..lp.len()))
                    .map(|e| (Bytes::copy_from_slice(e.field), Bytes::copy_from_slice(e.value)))
            }
            Encoding::Expanded(dict) => dict
                .random_entry(rng)
                .map(|e| (e.field.clone(), e.value.clone())),
        }
    }

    // ========================================================================
    // Scan
    // ========================================================================

    /// HSCAN
    ///
    /// A compact hash is returned whole with cursor 0. An expanded hash is
    /// walked with a reverse-binary cursor until at least `count` entries were
    /// inspected (or `10 * count` cursor positions were visited). `pattern`
    /// filters field names after inspection, so it only ever shrinks a page.
    pub fn scan(
        &mut self,
        cursor: u64,
        pattern: Option<&GlobPattern>,
        count: usize,
        now: u64,
    ) -> ScanResult {
        let pattern = pattern.filter(|p| !p.matches_everything());
        let wanted = |field: &[u8]| pattern.map_or(true, |p| p.matches(field));

        match &mut self.encoding {
            Encoding::Compact(lp) => {
                if lp.expiring_len() > 0 {
                    lp.retain(|e| !is_expired(e.expire_at, now));
                }
                let entries = lp
                    .iter()
                    .filter(|e| wanted(e.field))
                    .map(|e| (Bytes::copy_from_slice(e.field), Bytes::copy_from_slice(e.value)))
                    .collect();
                ScanResult { cursor: 0, entries }
            }
            Encoding::Expanded(dict) => {
                dict.rehash_step();

                let count = count.max(1);
                let max_steps = count.saturating_mul(10);
                let mut cursor = cursor;
                let mut inspected = 0;
                let mut steps = 0;
                let mut entries = Vec::new();
                let mut expired = Vec::new();

                loop {
                    cursor = dict.scan_step(cursor, |e| {
                        inspected += 1;
                        if is_expired(e.expire_at, now) {
                            expired.push(e.field.clone());
                        } else if wanted(&e.field) {
                            entries.push((e.field.clone(), e.value.clone()));
                        }
                    });
                    steps += 1;
                    if cursor == 0 || inspected >= count || steps >= max_steps {
                        break;
                    }
                }

                for field in &expired {
                    dict.remove(field);
                }
                ScanResult { cursor, entries }
            }
        }
    }

    // ========================================================================
    // Field TTLs and active expiry
    // ========================================================================

    /// Remaining lifetime of a field.
    pub fn field_ttl(&mut self, field: &[u8], now: u64) -> FieldTtl {
        self.read_live(field, now, |_, expire_at| remaining(expire_at, now))
            .unwrap_or(FieldTtl::Missing)
    }

    /// Gives an existing field a TTL. Returns false if the field is absent.
    pub fn expire_field(&mut self, field: &[u8], ttl_secs: u64, now: u64) -> bool {
        let Some(value) = self.get(field, now) else {
            return false;
        };
        let expire_at = expire_at_from_ttl(now, ttl_secs);
        if expire_at <= now {
            self.remove_raw(field);
        } else {
            self.write_raw(Bytes::copy_from_slice(field), value, Some(expire_at));
        }
        true
    }

    /// Removes a field's TTL. Returns false if it is absent or had none.
    pub fn persist_field(&mut self, field: &[u8], now: u64) -> bool {
        let found = self.read_live(field, now, |value, expire_at| {
            expire_at.map(|_| Bytes::copy_from_slice(value))
        });
        match found {
            Some(Some(value)) => {
                self.write_raw(Bytes::copy_from_slice(field), value, None);
                true
            }
            _ => false,
        }
    }

    /// Number of stored fields carrying a TTL.
    pub fn expiring_len(&self) -> usize {
        match &self.encoding {
            Encoding::Compact(lp) => lp.expiring_len(),
            Encoding::Expanded(dict) => dict.expiring_len(),
        }
    }

    /// Earliest field expiry, if any field has a TTL.
    pub fn next_expiry(&self) -> Option<u64> {
        match &self.encoding {
            Encoding::Compact(lp) if lp.expiring_len() == 0 => None,
            Encoding::Compact(lp) => lp.iter().filter_map(|e| e.expire_at).min(),
            Encoding::Expanded(dict) => dict.next_expiry(),
        }
    }

    /// Fields that carry a TTL, with their absolute expiry.
    pub fn fields_with_ttl(&self) -> Vec<(Bytes, u64)> {
        match &self.encoding {
            Encoding::Compact(lp) => lp
                .iter()
                .filter_map(|e| e.expire_at.map(|exp| (Bytes::copy_from_slice(e.field), exp)))
                .collect(),
            Encoding::Expanded(dict) => dict
                .expiring()
                .map(|(field, exp)| (field.clone(), exp))
                .collect(),
        }
    }

    /// Removes up to `limit` expired fields. Used by active expiry.
    pub fn purge_expired(&mut self, now: u64, limit: usize) -> usize {
        if limit == 0 || !self.next_expiry().is_some_and(|at| at <= now) {
            return 0;
        }
        match &mut self.encoding {
            Encoding::Compact(lp) => {
                let mut budget = limit;
                lp.retain(|e| {
                    if budget > 0 && is_expired(e.expire_at, now) {
                        budget -= 1;
                        false
                    } else {
                        true
                    }
                })
            }
            Encoding::Expanded(dict) => {
                let due = dict.expired_fields(now, limit);
                for field in &due {
                    dict.remove(field);
                }
                due.len()
            }
        }
    }

    /// Removes every expired field.
    pub fn expire_all(&mut self, now: u64) -> usize {
        self.purge_expired(now, usize::MAX)
    }
}

/// Picks `wanted` distinct items out of `len` by sampling ranks.
fn pick_ranks<T, R: Rng>(
    items: impl Iterator<Item = T>,
    len: usize,
    wanted: usize,
    rng: &mut R,
) -> Vec<T> {
    let mut ranks = index::sample(rng, len, wanted).into_vec();
    ranks.sort_unstable();

    let mut ranks = ranks.into_iter().peekable();
    let mut picked = Vec::with_capacity(wanted);
    for (rank, item) in items.enumerate() {
        if ranks.peek() == Some(&rank) {
            picked.push(item);
            ranks.next();
        }
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const T0: u64 = 1_700_000_000_000;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    fn small_config() -> HashConfig {
        HashConfig {
            max_compact_entries: 4,
            max_compact_value: 8,
            rehash_buckets_per_step: 1,
        }
    }

    fn sorted(mut entries: Vec<FieldEntry>) -> Vec<FieldEntry> {
        entries.sort_by(|a, b| a.field.cmp(&b.field));
        entries
    }

    #[test]
    fn test_set_get_len() {
        let mut hash = HashObject::new(HashConfig::default());

        assert!(hash.set(b("a"), b("1"), T0));
        assert!(!hash.set(b("a"), b("2"), T0));
        assert!(hash.set(b("b"), b(""), T0));

        assert_eq!(hash.len(T0), 2);
        assert_eq!(hash.get(b"a", T0), Some(b("2")));
        assert_eq!(hash.get(b"b", T0), Some(b("")));
        assert_eq!(hash.get(b"c", T0), None);
        assert_eq!(hash.encoding(), EncodingKind::Compact);
    }

    #[test]
    fn test_set_many_counts_created_only() {
        let mut hash = HashObject::new(HashConfig::default());
        hash.set(b("a"), b("0"), T0);

        let created = hash.set_many(vec![(b("a"), b("1")), (b("b"), b("2")), (b("c"), b("3"))], T0);
        assert_eq!(created, 2);
        assert_eq!(hash.get_many(&[b("a"), b("x"), b("c")], T0), vec![Some(b("1")), None, Some(b("3"))]);
    }

    #[test]
    fn test_set_nx() {
        let mut hash = HashObject::new(HashConfig::default());
        assert!(hash.set_nx(b("field"), b("val"), T0));
        assert!(!hash.set_nx(b("field"), b("val2"), T0));
        assert_eq!(hash.get(b"field", T0), Some(b("val")));

        // A refused oversized value must not promote the hash.
        assert!(!hash.set_nx(b("field"), Bytes::from(vec![b'a'; 512]), T0));
        assert_eq!(hash.encoding(), EncodingKind::Compact);
    }

    #[test]
    fn test_promotion_by_entry_count() {
        let mut hash = HashObject::new(small_config());
        for i in 0..4 {
            hash.set(b(&format!("f{}", i)), b("v"), T0);
        }
        assert_eq!(hash.encoding(), EncodingKind::Compact);

        hash.set(b("f4"), b("v"), T0);
        assert_eq!(hash.encoding(), EncodingKind::Expanded);
        assert_eq!(hash.len(T0), 5);
    }

    #[test]
    fn test_promotion_by_value_size() {
        let mut hash = HashObject::new(small_config());
        hash.set(b("a"), b("short"), T0);
        hash.set(b("a"), b("much too long"), T0);
        assert_eq!(hash.encoding(), EncodingKind::Expanded);
        assert_eq!(hash.get(b"a", T0), Some(b("much too long")));

        let mut by_field = HashObject::new(small_config());
        by_field.set(b("a-very-long-field"), b("v"), T0);
        assert_eq!(by_field.encoding(), EncodingKind::Expanded);
    }

    #[test]
    fn test_promotion_is_one_way() {
        let mut hash = HashObject::new(small_config());
        for i in 0..10 {
            hash.set(b(&format!("f{}", i)), b("v"), T0);
        }
        for i in 1..10 {
            hash.delete(format!("f{}", i).as_bytes(), T0);
        }
        assert_eq!(hash.len(T0), 1);
        assert_eq!(hash.encoding(), EncodingKind::Expanded);
    }

    #[test]
    fn test_promotion_preserves_entries() {
        let mut hash = HashObject::new(small_config());
        hash.set(b("a"), b("1"), T0);
        hash.set_with_ttl(b("b"), b("2"), 100, T0);
        hash.set(b("c"), b("3"), T0);
        hash.set_with_ttl(b("d"), b("4"), 5, T0);
        let before = sorted(hash.entries(T0));

        hash.set(b("e"), b("5"), T0);
        assert_eq!(hash.encoding(), EncodingKind::Expanded);
        hash.delete(b"e", T0);

        assert_eq!(sorted(hash.entries(T0)), before);
        assert_eq!(hash.expiring_len(), 2);
    }

    #[test]
    fn test_starts_expanded_with_zero_entry_limit() {
        let config = HashConfig {
            max_compact_entries: 0,
            ..HashConfig::default()
        };
        let hash = HashObject::new(config);
        assert_eq!(hash.encoding(), EncodingKind::Expanded);
    }

    #[test]
    fn test_lazy_expiry_on_get() {
        for config in [HashConfig::default(), small_config()] {
            let mut hash = HashObject::new(config);
            for i in 0..6 {
                hash.set(b(&format!("keep{}", i)), b("v"), T0);
            }
            assert!(hash.set_with_ttl(b("f"), b("v"), 1, T0));

            assert_eq!(hash.get(b"f", T0 + 500), Some(b("v")));
            assert_eq!(hash.stored_len(), 7);

            assert_eq!(hash.get(b"f", T0 + 1_000), None);
            // Removed by the read itself, no explicit delete needed.
            assert_eq!(hash.stored_len(), 6);
            assert!(!hash.exists(b"f", T0 + 1_000));
            assert_eq!(hash.len(T0 + 1_000), 6);
        }
    }

    #[test]
    fn test_expired_field_semantics() {
        let mut hash = HashObject::new(HashConfig::default());
        hash.set_with_ttl(b("a"), b("1"), 1, T0);
        hash.set_with_ttl(b("b"), b("2"), 1, T0);
        let later = T0 + 2_000;

        assert!(!hash.delete(b"a", later));
        assert!(hash.set(b("b"), b("fresh"), later));
        assert_eq!(hash.field_ttl(b"b", later), FieldTtl::Persistent);
        assert_eq!(hash.strlen(b"b", later), 5);
        assert_eq!(hash.len(later), 1);
    }

    #[test]
    fn test_last_field_expiring_empties_object() {
        let mut hash = HashObject::new(HashConfig::default());
        hash.set_with_ttl(b("only"), b("v"), 1, T0);
        assert!(!hash.is_empty());

        assert_eq!(hash.get(b"only", T0 + 1_000), None);
        assert!(hash.is_empty());
    }

    #[test]
    fn test_bulk_reads_skip_expired() {
        let mut hash = HashObject::new(HashConfig::default());
        hash.set(b("a"), b("1"), T0);
        hash.set_with_ttl(b("b"), b("2"), 1, T0);
        let later = T0 + 1_000;

        assert_eq!(hash.get_all(later), vec![(b("a"), b("1"))]);
        assert_eq!(hash.keys(later), vec![b("a")]);
        assert_eq!(hash.values(later), vec![b("1")]);
    }

    #[test]
    fn test_incr_by() {
        let mut hash = HashObject::new(HashConfig::default());
        assert_eq!(hash.incr_by(b("n"), 10, T0), Ok(10));
        assert_eq!(hash.incr_by(b("n"), -15, T0), Ok(-5));
        assert_eq!(hash.get(b"n", T0), Some(b("-5")));

        hash.set(b("a"), b(" 1"), T0);
        assert_eq!(hash.incr_by(b("a"), 10, T0), Err(HashError::NotAnInteger));
        assert_eq!(hash.get(b"a", T0), Some(b(" 1")));

        hash.set(b("max"), Bytes::from(i64::MAX.to_string()), T0);
        assert_eq!(hash.incr_by(b("max"), 1, T0), Err(HashError::IncrementOverflow));
        assert_eq!(hash.get(b"max", T0), Some(Bytes::from(i64::MAX.to_string())));

        // The rest of the hash is untouched by failures.
        assert_eq!(hash.len(T0), 3);
    }

    #[test]
    fn test_incr_keeps_ttl() {
        let mut hash = HashObject::new(HashConfig::default());
        hash.set_with_ttl(b("n"), b("1"), 10, T0);
        hash.incr_by(b("n"), 1, T0 + 1_000).unwrap();
        assert_eq!(hash.field_ttl(b"n", T0 + 1_000), FieldTtl::ExpiresIn(9_000));

        // Once expired, the counter restarts without a TTL.
        assert_eq!(hash.incr_by(b("n"), 1, T0 + 10_000), Ok(1));
        assert_eq!(hash.field_ttl(b"n", T0 + 10_000), FieldTtl::Persistent);
    }

    #[test]
    fn test_incr_by_float() {
        let mut hash = HashObject::new(HashConfig::default());
        assert_eq!(hash.incr_by_float(b("a"), 1.5, T0), Ok(b("1.5")));
        assert_eq!(hash.incr_by_float(b("a"), 1.5, T0), Ok(b("3")));
        assert_eq!(hash.get(b"a", T0), Some(b("3")));

        hash.set(b("s"), b("abc"), T0);
        assert_eq!(hash.incr_by_float(b("s"), 1.0, T0), Err(HashError::NotAFloat));

        hash.set(b("big"), format_f64(f64::MAX), T0);
        assert_eq!(
            hash.incr_by_float(b("big"), f64::MAX, T0),
            Err(HashError::NonFiniteResult)
        );
        assert_eq!(hash.get(b"big", T0), Some(format_f64(f64::MAX)));
    }

    #[test]
    fn test_incr_by_float_many_fields() {
        let mut hash = HashObject::new(HashConfig::default());
        for i in 0..500 {
            hash.incr_by_float(b(&format!("v{}", i)), 1.5, T0).unwrap();
        }
        assert_eq!(hash.encoding(), EncodingKind::Expanded);
        for i in 0..500 {
            assert_eq!(hash.get(format!("v{}", i).as_bytes(), T0), Some(b("1.5")));
        }
    }

    #[test]
    fn test_rand_field_single() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut hash = HashObject::new(HashConfig::default());
        assert_eq!(hash.rand_field(&mut rng, T0), None);

        hash.set(b("1"), b("2"), T0);
        assert_eq!(hash.rand_field(&mut rng, T0), Some(b("1")));
    }

    #[test]
    fn test_rand_fields_positive_count_distinct() {
        let mut rng = StdRng::seed_from_u64(42);
        for n in [10usize, 300] {
            let mut hash = HashObject::new(HashConfig::default());
            for i in 0..n {
                hash.set(b(&format!("f{}", i)), b("v"), T0);
            }

            for k in [1i64, 3, (n / 2) as i64, n as i64 - 1] {
                let picked = hash.rand_fields(k, &mut rng, T0);
                let unique: HashSet<_> = picked.iter().map(|(f, _)| f.clone()).collect();
                assert_eq!(picked.len(), k as usize);
                assert_eq!(unique.len(), k as usize);
            }

            assert_eq!(hash.rand_fields(n as i64 + 5, &mut rng, T0).len(), n);
            assert!(hash.rand_fields(0, &mut rng, T0).is_empty());
        }
    }

    #[test]
    fn test_rand_fields_negative_count_allows_repeats() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut hash = HashObject::new(HashConfig::default());
        hash.set(b("a"), b("1"), T0);
        hash.set(b("b"), b("2"), T0);

        let picked = hash.rand_fields(-50, &mut rng, T0);
        assert_eq!(picked.len(), 50);
        assert!(picked.iter().all(|(f, _)| f == "a" || f == "b"));
    }

    #[test]
    fn test_rand_never_returns_expired() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut hash = HashObject::new(HashConfig::default());
        for i in 0..200 {
            hash.set_with_ttl(b(&format!("gone{}", i)), b("v"), 1, T0);
        }
        hash.set(b("alive"), b("v"), T0);

        let later = T0 + 5_000;
        for _ in 0..20 {
            assert_eq!(hash.rand_field(&mut rng, later), Some(b("alive")));
        }
        assert_eq!(hash.rand_fields(-3, &mut rng, later).len(), 3);
    }

    #[test]
    fn test_scan_compact_returns_everything() {
        let mut hash = HashObject::new(HashConfig::default());
        for i in 0..10 {
            hash.set(b(&format!("Field-{}", i)), b(&format!("Value-{}", i)), T0);
        }

        let page = hash.scan(0, None, 4, T0);
        assert_eq!(page.cursor, 0);
        assert_eq!(page.entries.len(), 10);

        let none = GlobPattern::new("*x*");
        assert!(hash.scan(0, Some(&none), 10, T0).entries.is_empty());

        let ones = GlobPattern::new("*1*");
        let page = hash.scan(0, Some(&ones), 10, T0);
        assert_eq!(page.entries, vec![(b("Field-1"), b("Value-1"))]);
    }

    #[test]
    fn test_scan_expanded_covers_all_fields() {
        let mut hash = HashObject::new(HashConfig::default());
        for i in 0..1_000 {
            hash.set(b(&format!("f{}", i)), b("v"), T0);
        }

        let mut seen = HashSet::new();
        let mut cursor = 0;
        let mut calls = 0;
        loop {
            let page = hash.scan(cursor, None, 20, T0);
            seen.extend(page.entries.into_iter().map(|(f, _)| f));
            cursor = page.cursor;
            calls += 1;
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(seen.len(), 1_000);
        assert!(calls > 1);
    }

    #[test]
    fn test_scan_count_bounds_page() {
        let mut hash = HashObject::new(HashConfig::default());
        for i in 0..200 {
            hash.set(b(&format!("KeyNum-{}", i)), b(&format!("KeyValue-{}", i)), T0);
        }

        let page = hash.scan(0, None, 20, T0);
        assert_ne!(page.cursor, 0);
        assert!(page.entries.len() >= 20 && page.entries.len() < 30, "{}", page.entries.len());
    }

    #[test]
    fn test_scan_reclaims_expired() {
        let mut hash = HashObject::new(HashConfig::default());
        for i in 0..300 {
            hash.set_with_ttl(b(&format!("t{}", i)), b("v"), 1, T0);
        }
        hash.set(b("keep"), b("v"), T0);

        let later = T0 + 1_000;
        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let page = hash.scan(cursor, None, 50, later);
            seen.extend(page.entries.into_iter().map(|(f, _)| f));
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }
        assert!(seen.iter().all(|f| f == "keep"));
        assert!(seen.contains(&b("keep")));
        assert_eq!(hash.stored_len(), 1);
    }

    #[test]
    fn test_field_ttl_management() {
        let mut hash = HashObject::new(HashConfig::default());
        hash.set(b("f"), b("v"), T0);

        assert_eq!(hash.field_ttl(b"missing", T0), FieldTtl::Missing);
        assert_eq!(hash.field_ttl(b"f", T0), FieldTtl::Persistent);
        assert!(!hash.persist_field(b"f", T0));

        assert!(hash.expire_field(b"f", 30, T0));
        assert_eq!(hash.field_ttl(b"f", T0 + 10_000), FieldTtl::ExpiresIn(20_000));
        assert_eq!(hash.get(b"f", T0 + 10_000), Some(b("v")));

        assert!(hash.persist_field(b"f", T0 + 10_000));
        assert_eq!(hash.field_ttl(b"f", T0 + 60_000), FieldTtl::Persistent);

        assert!(!hash.expire_field(b"missing", 30, T0));
        assert!(hash.expire_field(b"f", 0, T0));
        assert!(hash.is_empty());
    }

    #[test]
    fn test_set_with_ttl_nx() {
        let mut hash = HashObject::new(HashConfig::default());
        hash.set(b("f"), b("v"), T0);

        assert!(!hash.set_with_ttl_nx(b("f"), b("new"), 10, T0));
        assert_eq!(hash.field_ttl(b"f", T0), FieldTtl::Persistent);
        assert!(hash.set_with_ttl_nx(b("g"), b("new"), 10, T0));
        assert_eq!(hash.field_ttl(b"g", T0), FieldTtl::ExpiresIn(10_000));
    }

    #[test]
    fn test_active_expiry_hooks() {
        for config in [HashConfig::default(), small_config()] {
            let mut hash = HashObject::new(config);
            hash.set(b("p"), b("v"), T0);
            hash.set_with_ttl(b("a"), b("v"), 1, T0);
            hash.set_with_ttl(b("b"), b("v"), 2, T0);
            hash.set_with_ttl(b("c"), b("v"), 3, T0);

            assert_eq!(hash.next_expiry(), Some(T0 + 1_000));
            assert_eq!(hash.fields_with_ttl().len(), 3);

            assert_eq!(hash.purge_expired(T0 + 5_000, 2), 2);
            assert_eq!(hash.stored_len(), 2);
            assert_eq!(hash.purge_expired(T0 + 5_000, 10), 1);
            assert_eq!(hash.purge_expired(T0 + 5_000, 10), 0);
            assert_eq!(hash.next_expiry(), None);
            assert_eq!(hash.get(b"p", T0 + 5_000), Some(b("v")));
        }
    }

    #[test]
    fn test_purge_skips_hashes_with_nothing_due() {
        let mut hash = HashObject::new(HashConfig::default());
        hash.set(b("p"), b("v"), T0);
        assert_eq!(hash.next_expiry(), None);
        assert_eq!(hash.purge_expired(T0, usize::MAX), 0);

        hash.set_with_ttl(b("t"), b("v"), 10, T0);
        let usage = hash.memory_usage();
        assert_eq!(hash.purge_expired(T0 + 9_999, usize::MAX), 0);
        assert_eq!(hash.len(T0 + 9_999), 2);
        assert_eq!(hash.memory_usage(), usage);

        assert_eq!(hash.purge_expired(T0 + 10_000, 0), 0);
        assert_eq!(hash.purge_expired(T0 + 10_000, 1), 1);
        assert_eq!(hash.next_expiry(), None);
    }

    #[test]
    fn test_memory_usage_grows() {
        let mut hash = HashObject::new(HashConfig::default());
        let empty = hash.memory_usage();
        hash.set(b("field"), Bytes::from(vec![b'x'; 1024]), T0);
        assert!(hash.memory_usage() > empty + 1024);
    }
}
