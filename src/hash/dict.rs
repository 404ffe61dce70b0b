//! Expanded Hash Encoding
//!
//! A chained hash table with power-of-two bucket counts that resizes
//! incrementally. While a resize is in progress two table generations
//! coexist:
//!
//! ```text
//!            rehash_idx
//!                │
//!   tables[0]  ┌─┬─┬─┬─┬─┬─┬─┬─┐     buckets left of rehash_idx are empty,
//!   (old)      │ │ │ │x│x│ │x│x│     their entries already live in tables[1]
//!              └─┴─┴─┴─┴─┴─┴─┴─┘
//!   tables[1]  ┌─┬─┬─┬─┬─┬─┬─┬─┬─┬─┬─┬─┬─┬─┬─┬─┐
//!   (new)      │x│ │x│ │ │ │ │ │x│ │ │ │ │ │ │ │
//!              └─┴─┴─┴─┴─┴─┴─┴─┴─┴─┴─┴─┴─┴─┴─┴─┘
//! ```
//!
//! Every mutating call first migrates a bounded number of buckets, so no
//! single call ever pays for a full rehash. A field's home is computed from its
//! old-table bucket index: below `rehash_idx` it lives in the new table,
//! otherwise in the old one. Inserts follow the same rule, so a field is
//! never present in both generations.
//!
//! Fields carrying a TTL are additionally kept in an index ordered by expiry
//! time, which lets active expiry find due fields without walking the table.

use crate::hash::cursor::{next_cursor, next_expansion};
use crate::hash::entry::SetOutcome;
use bytes::Bytes;
use rand::Rng;
use std::collections::hash_map::RandomState;
use std::collections::BTreeSet;
use std::hash::BuildHasher;
use std::mem;
use tracing::trace;

/// Smallest table size.
const INITIAL_SIZE: usize = 4;

/// Shrink once fewer than this percentage of buckets would be used.
const MIN_FILL_PERCENT: usize = 10;

/// Empty buckets a migration step may skip per bucket it is allowed to move.
const EMPTY_VISITS_PER_BUCKET: usize = 10;

/// Rejection-sampling attempts before falling back to a rank walk.
const RANDOM_MAX_ATTEMPTS: usize = 64;

/// One stored field.
#[derive(Debug, Clone)]
pub struct DictEntry {
    pub field: Bytes,
    pub value: Bytes,
    pub expire_at: Option<u64>,
    hash: u64,
}

#[derive(Debug, Default)]
struct Table {
    buckets: Vec<Vec<DictEntry>>,
    used: usize,
    /// Upper bound on the longest chain; only reset when the table is replaced
    max_chain: usize,
}

impl Table {
    fn with_size(size: usize) -> Self {
        Self {
            buckets: (0..size).map(|_| Vec::new()).collect(),
            used: 0,
            max_chain: 0,
        }
    }

    #[inline]
    fn size(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.buckets.len().saturating_sub(1)
    }

    fn push(&mut self, bucket: usize, entry: DictEntry) {
        let chain = &mut self.buckets[bucket];
        chain.push(entry);
        self.used += 1;
        self.max_chain = self.max_chain.max(chain.len());
    }
}

/// Incrementally resized hash table from field name to (value, expiry).
pub struct Dict {
    tables: [Table; 2],
    /// Next bucket of `tables[0]` to migrate; None when no resize is running
    rehash_idx: Option<usize>,
    hash_builder: RandomState,
    /// Fields with a TTL, ordered by expiry
    expiring: BTreeSet<(u64, Bytes)>,
    /// Sum of field and value lengths
    payload_bytes: usize,
    /// Non-empty buckets migrated per step
    step_buckets: usize,
}

impl std::fmt::Debug for Dict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dict")
            .field("len", &self.len())
            .field("buckets", &(self.tables[0].size(), self.tables[1].size()))
            .field("rehash_idx", &self.rehash_idx)
            .field("expiring", &self.expiring.len())
            .finish()
    }
}

impl Dict {
    pub fn new(step_buckets: usize) -> Self {
        Self::with_capacity(0, step_buckets)
    }

    /// Creates a table sized to hold `capacity` fields without resizing.
    pub fn with_capacity(capacity: usize, step_buckets: usize) -> Self {
        Self {
            tables: [Table::with_size(table_size_for(capacity)), Table::default()],
            rehash_idx: None,
            hash_builder: RandomState::new(),
            expiring: BTreeSet::new(),
            payload_bytes: 0,
            step_buckets: step_buckets.max(1),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tables[0].used + self.tables[1].used
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_rehashing(&self) -> bool {
        self.rehash_idx.is_some()
    }

    /// Buckets across both generations.
    pub fn bucket_count(&self) -> usize {
        self.tables[0].size() + self.tables[1].size()
    }

    /// Number of fields that carry a TTL.
    pub fn expiring_len(&self) -> usize {
        self.expiring.len()
    }

    /// Approximate heap footprint in bytes.
    pub fn memory_usage(&self) -> usize {
        self.payload_bytes
            + self.len() * mem::size_of::<DictEntry>()
            + self.bucket_count() * mem::size_of::<Vec<DictEntry>>()
            + self.expiring.len() * mem::size_of::<(u64, Bytes)>()
    }

    #[inline]
    fn hash(&self, field: &[u8]) -> u64 {
        self.hash_builder.hash_one(field)
    }

    /// Table and bucket that own a hash right now.
    #[inline]
    fn home(&self, hash: u64) -> (usize, usize) {
        let b0 = hash as usize & self.tables[0].mask();
        match self.rehash_idx {
            Some(idx) if b0 < idx => (1, hash as usize & self.tables[1].mask()),
            _ => (0, b0),
        }
    }

    pub fn get(&self, field: &[u8]) -> Option<&DictEntry> {
        let hash = self.hash(field);
        let (t, b) = self.home(hash);
        self.tables[t].buckets[b]
            .iter()
            .find(|e| e.hash == hash && *e.field == *field)
    }

    /// Inserts or overwrites a field.
    pub fn insert(&mut self, field: Bytes, value: Bytes, expire_at: Option<u64>) -> SetOutcome {
        self.rehash_step();

        let hash = self.hash(&field);
        let (t, b) = self.home(hash);
        if let Some(entry) = self.tables[t].buckets[b]
            .iter_mut()
            .find(|e| e.hash == hash && *e.field == *field)
        {
            self.payload_bytes = self.payload_bytes - entry.value.len() + value.len();
            entry.value = value;
            let old_expire = mem::replace(&mut entry.expire_at, expire_at);
            if old_expire != expire_at {
                if let Some(exp) = old_expire {
                    self.expiring.remove(&(exp, field.clone()));
                }
                if let Some(exp) = expire_at {
                    self.expiring.insert((exp, field));
                }
            }
            return SetOutcome::Updated;
        }

        self.expand_if_needed();
        let (t, b) = self.home(hash);
        self.payload_bytes += field.len() + value.len();
        if let Some(exp) = expire_at {
            self.expiring.insert((exp, field.clone()));
        }
        self.tables[t].push(
            b,
            DictEntry {
                field,
                value,
                expire_at,
                hash,
            },
        );
        SetOutcome::Inserted
    }

    /// Removes a field, returning its entry.
    pub fn remove(&mut self, field: &[u8]) -> Option<DictEntry> {
        self.rehash_step();

        let hash = self.hash(field);
        let (t, b) = self.home(hash);
        let chain = &mut self.tables[t].buckets[b];
        let pos = chain
            .iter()
            .position(|e| e.hash == hash && *e.field == *field)?;
        let entry = chain.swap_remove(pos);
        self.tables[t].used -= 1;

        self.payload_bytes -= entry.field.len() + entry.value.len();
        if let Some(exp) = entry.expire_at {
            self.expiring.remove(&(exp, entry.field.clone()));
        }

        self.shrink_if_needed();
        Some(entry)
    }

    /// Iterates over all entries of both generations.
    pub fn iter(&self) -> impl Iterator<Item = &DictEntry> + '_ {
        self.tables
            .iter()
            .flat_map(|table| table.buckets.iter())
            .flatten()
    }

    /// Visits the bucket(s) at `cursor` and returns the next cursor.
    ///
    /// Outside a resize this is one bucket. During a resize it is the bucket
    /// of the smaller table plus every bucket of the larger table that expands
    /// it. Returns 0 when the scan is complete.
    pub fn scan_step(&self, cursor: u64, mut visit: impl FnMut(&DictEntry)) -> u64 {
        if self.rehash_idx.is_none() {
            let table = &self.tables[0];
            let mask = table.mask() as u64;
            table.buckets[(cursor & mask) as usize]
                .iter()
                .for_each(&mut visit);
            return next_cursor(cursor, mask);
        }

        let (small, large) = if self.tables[0].size() <= self.tables[1].size() {
            (&self.tables[0], &self.tables[1])
        } else {
            (&self.tables[1], &self.tables[0])
        };
        let (small_mask, large_mask) = (small.mask() as u64, large.mask() as u64);

        small.buckets[(cursor & small_mask) as usize]
            .iter()
            .for_each(&mut visit);

        let mut cursor = cursor;
        loop {
            large.buckets[(cursor & large_mask) as usize]
                .iter()
                .for_each(&mut visit);
            let (next, more) = next_expansion(cursor, small_mask, large_mask);
            cursor = next;
            if !more {
                return cursor;
            }
        }
    }

    /// Picks an entry uniformly at random.
    ///
    /// Samples a (bucket, chain position) pair over both generations, using
    /// the longest-chain bound so every entry has the same odds, and rejects
    /// empty slots. After a bounded number of misses it falls back to a
    /// uniform rank walk, so sparse tables cannot loop forever.
    pub fn random_entry<R: Rng>(&self, rng: &mut R) -> Option<&DictEntry> {
        let len = self.len();
        if len == 0 {
            return None;
        }

        let size0 = self.tables[0].size();
        let total = size0 + self.tables[1].size();
        let bound = self.tables[0]
            .max_chain
            .max(self.tables[1].max_chain)
            .max(1);

        for _ in 0..RANDOM_MAX_ATTEMPTS {
            let bucket = rng.random_range(0..total);
            let chain = if bucket < size0 {
                &self.tables[0].buckets[bucket]
            } else {
                &self.tables[1].buckets[bucket - size0]
            };
            if let Some(entry) = chain.get(rng.random_range(0..bound)) {
                return Some(entry);
            }
        }

        self.iter().nth(rng.random_range(0..len))
    }

    /// Earliest expiry among fields with a TTL.
    pub fn next_expiry(&self) -> Option<u64> {
        self.expiring.first().map(|(exp, _)| *exp)
    }

    /// Up to `limit` fields whose expiry is at or before `now`, earliest first.
    pub fn expired_fields(&self, now: u64, limit: usize) -> Vec<Bytes> {
        self.expiring
            .iter()
            .take_while(|(exp, _)| *exp <= now)
            .take(limit)
            .map(|(_, field)| field.clone())
            .collect()
    }

    /// Fields with a TTL and their expiry, earliest first.
    pub fn expiring(&self) -> impl Iterator<Item = (&Bytes, u64)> + '_ {
        self.expiring.iter().map(|(exp, field)| (field, *exp))
    }

    /// Advances an in-progress resize by one bounded step.
    pub fn rehash_step(&mut self) {
        if self.rehash_idx.is_some() {
            self.rehash(self.step_buckets);
        }
    }

    fn rehash(&mut self, buckets: usize) {
        let Some(mut idx) = self.rehash_idx else {
            return;
        };

        let mut empty_visits = buckets * EMPTY_VISITS_PER_BUCKET;
        let mut moved = 0;
        while moved < buckets && self.tables[0].used > 0 {
            // Entries of tables[0] all sit at or after idx, so idx stays in range.
            if self.tables[0].buckets[idx].is_empty() {
                idx += 1;
                empty_visits -= 1;
                if empty_visits == 0 {
                    break;
                }
                continue;
            }

            let chain = mem::take(&mut self.tables[0].buckets[idx]);
            self.tables[0].used -= chain.len();
            let mask = self.tables[1].mask();
            for entry in chain {
                let bucket = entry.hash as usize & mask;
                self.tables[1].push(bucket, entry);
            }
            idx += 1;
            moved += 1;
        }

        if self.tables[0].used == 0 {
            self.tables[0] = mem::take(&mut self.tables[1]);
            self.rehash_idx = None;
            trace!(
                size = self.tables[0].size(),
                len = self.tables[0].used,
                "hash table resize finished"
            );
        } else {
            self.rehash_idx = Some(idx);
        }
    }

    fn expand_if_needed(&mut self) {
        if self.rehash_idx.is_some() {
            return;
        }
        let size = self.tables[0].size();
        if self.tables[0].used >= size {
            self.start_resize(size * 2);
        }
    }

    fn shrink_if_needed(&mut self) {
        if self.rehash_idx.is_some() {
            return;
        }
        let size = self.tables[0].size();
        let used = self.tables[0].used;
        if size > INITIAL_SIZE && used * 100 < size * MIN_FILL_PERCENT {
            self.start_resize(table_size_for(used));
        }
    }

    fn start_resize(&mut self, size: usize) {
        trace!(
            from = self.tables[0].size(),
            to = size,
            len = self.len(),
            "hash table resize started"
        );
        self.tables[1] = Table::with_size(size);
        self.rehash_idx = Some(0);
    }
}

fn table_size_for(capacity: usize) -> usize {
    capacity.max(INITIAL_SIZE).next_power_of_two()
}
