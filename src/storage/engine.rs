//! Thread-Safe Hash Keyspace
//!
//! This module implements the keyspace that owns every hash object. It is the
//! "caller" the hash core expects: it supplies the current time, passes the
//! configured thresholds to new objects, and drops a key as soon as its hash
//! becomes empty (including when the last field expires).
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │            │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │            │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │            │
//! │  │ <key,   │ │ <key,   │ │ <key,   │ │ <key,   │            │
//! │  │  Hash>  │ │  Hash>  │ │  Hash>  │ │  Hash>  │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A hash object is never shared between threads: every operation runs under
//! its shard's lock. Single-field reads take the read lock and only upgrade to
//! the write lock when they hit an expired field that must be reclaimed.
//!
//! Each shard also indexes the keys holding at least one field with a TTL.
//! Active expiry walks only that index, resuming where the previous cycle
//! stopped, so a keyspace without TTLs costs nothing to sweep.

use crate::clock::{Clock, SystemClock};
use crate::error::HashResult;
use crate::hash::{EncodingKind, FieldTtl, GlobPattern, HashConfig, HashObject, Lookup, ScanResult};
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// Contents of one shard.
#[derive(Debug, Default)]
struct ShardData {
    hashes: HashMap<Bytes, HashObject>,
    /// Keys whose hash has at least one field with a TTL
    volatile: BTreeSet<Bytes>,
    /// Last volatile key inspected by active expiry
    expire_after: Option<Bytes>,
}

impl ShardData {
    /// Brings `key`'s membership in the volatile index up to date.
    fn sync_volatile(&mut self, key: &[u8]) {
        let has_ttl = self
            .hashes
            .get(key)
            .is_some_and(|hash| hash.expiring_len() > 0);
        if !has_ttl {
            self.volatile.remove(key);
        } else if !self.volatile.contains(key) {
            self.volatile.insert(Bytes::copy_from_slice(key));
        }
    }

    /// Up to `limit` volatile keys following the expiry cursor, wrapping once.
    fn volatile_batch(&self, limit: usize) -> Vec<Bytes> {
        match &self.expire_after {
            None => self.volatile.iter().take(limit).cloned().collect(),
            Some(last) => self
                .volatile
                .range::<Bytes, _>((Excluded(last), Unbounded))
                .chain(self.volatile.range::<Bytes, _>((Unbounded, Included(last))))
                .take(limit)
                .cloned()
                .collect(),
        }
    }
}

/// A single shard containing a portion of the keys.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<ShardData>,
}

impl Shard {
    fn read(&self) -> RwLockReadGuard<'_, ShardData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ShardData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The keyspace of hash objects.
///
/// # Thread Safety
///
/// Designed to be wrapped in an `Arc` and shared across all client handler
/// tasks. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use flashkv_hash::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
///
/// let created = engine.hset(
///     Bytes::from("user:1"),
///     vec![(Bytes::from("name"), Bytes::from("Ariz"))],
/// );
/// assert_eq!(created, 1);
///
/// let name = engine.hget(b"user:1", b"name");
/// assert_eq!(name, Some(Bytes::from("Ariz")));
/// ```
pub struct StorageEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<Shard>,

    /// Thresholds copied into every new hash
    config: HashConfig,

    /// Source of `now` for field expiry
    clock: Arc<dyn Clock>,

    /// Shard where the next active expiry cycle starts
    expire_cursor: AtomicUsize,

    /// Statistics: number of keys currently stored
    key_count: AtomicU64,

    /// Statistics: read commands served
    read_count: AtomicU64,

    /// Statistics: write commands served
    write_count: AtomicU64,

    /// Statistics: keys removed by DEL
    del_count: AtomicU64,

    /// Statistics: fields removed by active expiry
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("config", &self.config)
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("read_count", &self.read_count.load(Ordering::Relaxed))
            .field("write_count", &self.write_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an engine with default thresholds and the system clock.
    pub fn new() -> Self {
        Self::with_config(HashConfig::default())
    }

    /// Creates an engine with custom hash thresholds.
    pub fn with_config(config: HashConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an engine reading time from `clock`.
    pub fn with_clock(config: HashConfig, clock: Arc<dyn Clock>) -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();

        Self {
            shards,
            config,
            clock,
            expire_cursor: AtomicUsize::new(0),
            key_count: AtomicU64::new(0),
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HashConfig {
        &self.config
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Runs `op` on the hash at `key`, creating an empty one if needed.
    ///
    /// The key is dropped again if the hash is empty afterwards.
    fn with_hash<T>(&self, key: Bytes, op: impl FnOnce(&mut HashObject, u64) -> T) -> T {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now_ms();
        let config = self.config;

        let mut guard = self.get_shard(&key).write();
        let data = &mut *guard;
        let existed = data.hashes.contains_key(&key);
        let hash = data
            .hashes
            .entry(key.clone())
            .or_insert_with(|| HashObject::new(config));
        let result = op(hash, now);

        match (existed, hash.is_empty()) {
            (true, true) => {
                data.hashes.remove(&key);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
            }
            (false, true) => {
                data.hashes.remove(&key);
            }
            (false, false) => {
                self.key_count.fetch_add(1, Ordering::Relaxed);
            }
            (true, false) => {}
        }
        data.sync_volatile(&key);
        result
    }

    /// Runs `op` on the hash at `key` if there is one.
    ///
    /// The key is dropped if the hash is empty afterwards.
    fn with_existing<T>(&self, key: &[u8], op: impl FnOnce(&mut HashObject, u64) -> T) -> Option<T> {
        let now = self.clock.now_ms();
        let mut guard = self.get_shard(key).write();
        let data = &mut *guard;
        let hash = data.hashes.get_mut(key)?;
        let result = op(hash, now);

        if hash.is_empty() {
            data.hashes.remove(key);
            self.key_count.fetch_sub(1, Ordering::Relaxed);
        }
        data.sync_volatile(key);
        Some(result)
    }

    /// Reads one field under the read lock.
    ///
    /// Falls back to the write lock only to reclaim an expired field.
    fn read_field<T>(&self, key: &[u8], field: &[u8], read: impl Fn(&[u8]) -> T) -> Option<T> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now_ms();

        {
            let data = self.get_shard(key).read();
            match data.hashes.get(key).map(|hash| hash.lookup(field, now)) {
                None | Some(Lookup::Missing) => return None,
                Some(Lookup::Live { value, .. }) => return Some(read(value)),
                Some(Lookup::Expired) => {}
            }
        }

        // Expired hit: reclaim it under the write lock. Another writer may
        // have replaced the field in between, so look it up again.
        self.with_existing(key, |hash, now| {
            hash.purge_if_expired(field, now);
            match hash.lookup(field, now) {
                Lookup::Live { value, .. } => Some(read(value)),
                _ => None,
            }
        })
        .flatten()
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// HSET: sets every pair, clearing any field TTLs.
    ///
    /// # Returns
    ///
    /// The number of fields that were created.
    pub fn hset(&self, key: Bytes, pairs: Vec<(Bytes, Bytes)>) -> usize {
        self.with_hash(key, |hash, now| hash.set_many(pairs, now))
    }

    /// HSETNX: sets the field only if it does not exist.
    pub fn hsetnx(&self, key: Bytes, field: Bytes, value: Bytes) -> bool {
        self.with_hash(key, |hash, now| hash.set_nx(field, value, now))
    }

    /// HSETEX: sets every pair with a TTL of `ttl_secs` seconds.
    ///
    /// With `only_if_absent`, live fields are left untouched.
    ///
    /// # Returns
    ///
    /// The number of fields that were created.
    pub fn hsetex(
        &self,
        key: Bytes,
        pairs: Vec<(Bytes, Bytes)>,
        ttl_secs: u64,
        only_if_absent: bool,
    ) -> usize {
        self.with_hash(key, |hash, now| {
            pairs
                .into_iter()
                .filter(|(field, value)| {
                    let (field, value) = (field.clone(), value.clone());
                    if only_if_absent {
                        hash.set_with_ttl_nx(field, value, ttl_secs, now)
                    } else {
                        hash.set_with_ttl(field, value, ttl_secs, now)
                    }
                })
                .count()
        })
    }

    /// HDEL
    ///
    /// # Returns
    ///
    /// The number of fields that were removed.
    pub fn hdel(&self, key: &[u8], fields: &[Bytes]) -> usize {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.with_existing(key, |hash, now| hash.delete_many(fields, now))
            .unwrap_or(0)
    }

    /// HINCRBY
    pub fn hincrby(&self, key: Bytes, field: Bytes, delta: i64) -> HashResult<i64> {
        self.with_hash(key, |hash, now| hash.incr_by(field, delta, now))
    }

    /// HINCRBYFLOAT
    ///
    /// # Returns
    ///
    /// The stored representation of the new value.
    pub fn hincrbyfloat(&self, key: Bytes, field: Bytes, delta: f64) -> HashResult<Bytes> {
        self.with_hash(key, |hash, now| hash.incr_by_float(field, delta, now))
    }

    /// Gives each listed field a TTL. One flag per field: true if it existed.
    pub fn field_expire(&self, key: &[u8], ttl_secs: u64, fields: &[Bytes]) -> Vec<bool> {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.with_existing(key, |hash, now| {
            fields
                .iter()
                .map(|field| hash.expire_field(field, ttl_secs, now))
                .collect()
        })
        .unwrap_or_else(|| vec![false; fields.len()])
    }

    /// HPERSIST: one flag per field, true if a TTL was removed.
    pub fn hpersist(&self, key: &[u8], fields: &[Bytes]) -> Vec<bool> {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.with_existing(key, |hash, now| {
            fields
                .iter()
                .map(|field| hash.persist_field(field, now))
                .collect()
        })
        .unwrap_or_else(|| vec![false; fields.len()])
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// HGET
    pub fn hget(&self, key: &[u8], field: &[u8]) -> Option<Bytes> {
        self.read_field(key, field, Bytes::copy_from_slice)
    }

    /// HSTRLEN: 0 if the key or field does not exist.
    pub fn hstrlen(&self, key: &[u8], field: &[u8]) -> usize {
        self.read_field(key, field, <[u8]>::len).unwrap_or(0)
    }

    /// HEXISTS
    pub fn hexists(&self, key: &[u8], field: &[u8]) -> bool {
        self.read_field(key, field, |_| ()).is_some()
    }

    /// HMGET: one result per field, `None` for missing ones.
    pub fn hmget(&self, key: &[u8], fields: &[Bytes]) -> Vec<Option<Bytes>> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.with_existing(key, |hash, now| hash.get_many(fields, now))
            .unwrap_or_else(|| vec![None; fields.len()])
    }

    /// HGETALL
    pub fn hgetall(&self, key: &[u8]) -> Vec<(Bytes, Bytes)> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.with_existing(key, |hash, now| hash.get_all(now))
            .unwrap_or_default()
    }

    /// HKEYS
    pub fn hkeys(&self, key: &[u8]) -> Vec<Bytes> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.with_existing(key, |hash, now| hash.keys(now))
            .unwrap_or_default()
    }

    /// HVALS
    pub fn hvals(&self, key: &[u8]) -> Vec<Bytes> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.with_existing(key, |hash, now| hash.values(now))
            .unwrap_or_default()
    }

    /// HLEN: number of live fields.
    pub fn hlen(&self, key: &[u8]) -> usize {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.with_existing(key, |hash, now| hash.len(now))
            .unwrap_or(0)
    }

    /// HRANDFIELD without a count.
    pub fn hrandfield(&self, key: &[u8]) -> Option<Bytes> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.with_existing(key, |hash, now| hash.rand_field(&mut rand::rng(), now))
            .flatten()
    }

    /// HRANDFIELD with a count. See [`HashObject::rand_fields`].
    pub fn hrandfield_count(&self, key: &[u8], count: i64) -> Vec<(Bytes, Bytes)> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.with_existing(key, |hash, now| hash.rand_fields(count, &mut rand::rng(), now))
            .unwrap_or_default()
    }

    /// HSCAN: one page starting at `cursor`.
    pub fn hscan(
        &self,
        key: &[u8],
        cursor: u64,
        pattern: Option<&GlobPattern>,
        count: usize,
    ) -> ScanResult {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.with_existing(key, |hash, now| hash.scan(cursor, pattern, count, now))
            .unwrap_or_default()
    }

    /// Remaining lifetime of one field.
    pub fn field_ttl(&self, key: &[u8], field: &[u8]) -> FieldTtl {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.with_existing(key, |hash, now| hash.field_ttl(field, now))
            .unwrap_or(FieldTtl::Missing)
    }

    // ========================================================================
    // KEY-LEVEL OPERATIONS
    // ========================================================================

    /// Deletes whole keys. Returns how many existed.
    pub fn del(&self, keys: &[Bytes]) -> u64 {
        let mut removed = 0;
        for key in keys {
            let mut data = self.get_shard(key).write();
            data.volatile.remove(key);
            if data.hashes.remove(key).is_some() {
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                removed += 1;
            }
        }
        self.del_count.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    /// Counts the keys that hold at least one live field.
    pub fn exists(&self, keys: &[Bytes]) -> u64 {
        keys.iter()
            .filter(|key| {
                self.with_existing(key, |hash, now| hash.len(now) > 0)
                    .unwrap_or(false)
            })
            .count() as u64
    }

    /// Current encoding of the hash at `key`.
    pub fn object_encoding(&self, key: &[u8]) -> Option<EncodingKind> {
        self.get_shard(key)
            .read()
            .hashes
            .get(key)
            .map(HashObject::encoding)
    }

    /// Approximate memory footprint of the hash at `key`.
    pub fn memory_usage(&self, key: &[u8]) -> Option<usize> {
        self.get_shard(key)
            .read()
            .hashes
            .get(key)
            .map(|hash| key.len() + hash.memory_usage())
    }

    /// Removes every key.
    pub fn flush(&self) {
        for shard in &self.shards {
            *shard.write() = ShardData::default();
        }
        self.key_count.store(0, Ordering::Relaxed);
    }

    /// Approximate number of keys.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns engine statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            read_ops: self.read_count.load(Ordering::Relaxed),
            write_ops: self.write_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired_fields: self.expired_count.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // ACTIVE EXPIRY
    // ========================================================================

    /// Removes up to `field_budget` expired fields, inspecting at most
    /// `key_budget` keys.
    ///
    /// Only keys holding a field with a TTL are inspected. Shards are visited
    /// round-robin and each shard resumes after the last key it inspected,
    /// so repeated cycles cover every such key. Keys whose last field
    /// expired are dropped.
    pub fn active_expire_cycle(
        &self,
        field_budget: usize,
        key_budget: usize,
    ) -> ActiveExpireStats {
        let now = self.clock.now_ms();
        let mut stats = ActiveExpireStats::default();
        let mut fields_left = field_budget;
        let mut keys_left = key_budget;
        let start = self.expire_cursor.load(Ordering::Relaxed);
        let mut next_start = start;

        for offset in 0..NUM_SHARDS {
            if fields_left == 0 || keys_left == 0 {
                break;
            }
            let index = (start + offset) % NUM_SHARDS;
            let mut guard = self.shards[index].write();
            let data = &mut *guard;

            for key in data.volatile_batch(keys_left) {
                if fields_left == 0 {
                    break;
                }
                keys_left -= 1;
                stats.keys_inspected += 1;

                if let Some(hash) = data.hashes.get_mut(&key) {
                    if hash.next_expiry().is_some_and(|at| at <= now) {
                        stats.keys_visited += 1;
                        let removed = hash.purge_expired(now, fields_left);
                        fields_left -= removed;
                        stats.fields_expired += removed;
                    }
                    if hash.is_empty() {
                        data.hashes.remove(&key);
                        stats.keys_removed += 1;
                    }
                }
                data.sync_volatile(&key);
                data.expire_after = Some(key);
            }

            // Resume in this shard if a budget ran out inside it.
            next_start = if fields_left == 0 || keys_left == 0 {
                index
            } else {
                (index + 1) % NUM_SHARDS
            };
        }

        self.expire_cursor.store(next_start, Ordering::Relaxed);
        stats.budget_exhausted = fields_left == 0;
        if stats.keys_removed > 0 {
            self.key_count
                .fetch_sub(stats.keys_removed as u64, Ordering::Relaxed);
        }
        self.expired_count
            .fetch_add(stats.fields_expired as u64, Ordering::Relaxed);
        stats
    }
}

/// Engine statistics.
#[derive(Debug, Clone, Copy)]
pub struct StorageStats {
    /// Number of keys currently stored
    pub keys: u64,
    /// Read commands served
    pub read_ops: u64,
    /// Write commands served
    pub write_ops: u64,
    /// Keys removed by DEL
    pub del_ops: u64,
    /// Fields removed by active expiry
    pub expired_fields: u64,
}

/// Outcome of one [`StorageEngine::active_expire_cycle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveExpireStats {
    /// Keys with a TTL field that were looked at
    pub keys_inspected: usize,
    /// Keys that had at least one due field
    pub keys_visited: usize,
    /// Fields removed
    pub fields_expired: usize,
    /// Keys dropped because their last field expired
    pub keys_removed: usize,
    /// True if the cycle stopped because it ran out of field budget
    pub budget_exhausted: bool,
}
