//! Command Handler Module
//!
//! Implements the Redis-compatible hash commands on top of the storage engine.
//! Each command is validated (arity, numeric arguments, options), executed and
//! turned into a RESP reply.
//!
//! ## Supported Commands
//!
//! ### Writes
//! - `HSET key field value [field value ...]` - Set fields, returns created count
//! - `HMSET key field value [field value ...]` - Same as HSET, replies OK
//! - `HSETNX key field value` - Set a field only if absent
//! - `HSETEX key [NX] seconds field value [field value ...]` - Set fields with a TTL
//! - `HDEL key field [field ...]` - Delete fields
//! - `HINCRBY key field increment` - Integer increment
//! - `HINCRBYFLOAT key field increment` - Float increment
//!
//! ### Reads
//! - `HGET key field`, `HMGET key field [field ...]`
//! - `HGETALL key`, `HKEYS key`, `HVALS key`, `HLEN key`
//! - `HSTRLEN key field`, `HEXISTS key field`
//! - `HRANDFIELD key [count [WITHVALUES]]`
//! - `HSCAN key cursor [MATCH pattern] [COUNT count] [NOVALUES]`
//!
//! ### Field TTLs
//! - `FIELDTTL key field` - Seconds left, -1 without TTL, -2 if missing
//! - `FIELDEXPIRE key seconds field [field ...]` - Give fields a TTL
//! - `HPERSIST key field [field ...]` - Remove field TTLs
//!
//! ### Keys
//! - `DEL key [key ...]`, `EXISTS key [key ...]`, `OBJECT ENCODING key`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  execute()  │───>│  dispatch() │───>│  cmd_xxx()  │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      StorageEngine          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::hash::numeric::{parse_f64, parse_i64};
use crate::hash::{FieldTtl, GlobPattern};
use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;

/// Default COUNT for HSCAN.
const DEFAULT_SCAN_COUNT: usize = 10;

/// Largest |count| HRANDFIELD accepts.
const MAX_RANDFIELD_COUNT: i64 = i64::MAX / 2;

/// Handles hash commands by dispatching them to the storage engine.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes a command and returns the response.
    ///
    /// # Arguments
    ///
    /// * `command` - An array whose first element is the command name
    ///
    /// # Returns
    ///
    /// The RESP response to send back to the client.
    pub fn execute(&self, command: RespValue) -> RespValue {
        let args = match command {
            RespValue::Array(args) => args,
            _ => return RespValue::error("ERR invalid command format"),
        };

        let Some(name) = args.first() else {
            return RespValue::error("ERR empty command");
        };
        let cmd_name = match self.get_string(name) {
            Some(s) => s.to_uppercase(),
            None => return RespValue::error("ERR invalid command name"),
        };

        self.dispatch(&cmd_name, &args[1..])
    }

    fn dispatch(&self, cmd: &str, args: &[RespValue]) -> RespValue {
        match cmd {
            // Writes
            "HSET" => self.cmd_hset(args),
            "HMSET" => self.cmd_hmset(args),
            "HSETNX" => self.cmd_hsetnx(args),
            "HSETEX" => self.cmd_hsetex(args),
            "HDEL" => self.cmd_hdel(args),
            "HINCRBY" => self.cmd_hincrby(args),
            "HINCRBYFLOAT" => self.cmd_hincrbyfloat(args),

            // Reads
            "HGET" => self.cmd_hget(args),
            "HMGET" => self.cmd_hmget(args),
            "HGETALL" => self.cmd_hgetall(args),
            "HKEYS" => self.cmd_hkeys(args),
            "HVALS" => self.cmd_hvals(args),
            "HLEN" => self.cmd_hlen(args),
            "HSTRLEN" => self.cmd_hstrlen(args),
            "HEXISTS" => self.cmd_hexists(args),
            "HRANDFIELD" => self.cmd_hrandfield(args),
            "HSCAN" => self.cmd_hscan(args),

            // Field TTLs
            "FIELDTTL" => self.cmd_fieldttl(args),
            "FIELDEXPIRE" => self.cmd_fieldexpire(args),
            "HPERSIST" => self.cmd_hpersist(args),

            // Keys
            "DEL" => self.cmd_del(args),
            "EXISTS" => self.cmd_exists(args),
            "OBJECT" => self.cmd_object(args),

            _ => RespValue::error(format!("ERR unknown command '{}'", cmd)),
        }
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    /// Extracts a Bytes value from a RespValue.
    fn get_bytes(&self, value: &RespValue) -> Option<Bytes> {
        match value {
            RespValue::BulkString(b) => Some(b.clone()),
            RespValue::SimpleString(s) => Some(Bytes::from(s.clone())),
            _ => None,
        }
    }

    /// Extracts a UTF-8 string from a RespValue.
    fn get_string(&self, value: &RespValue) -> Option<String> {
        match value {
            RespValue::BulkString(b) => std::str::from_utf8(b).ok().map(str::to_string),
            RespValue::SimpleString(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Extracts a strictly formatted integer from a RespValue.
    fn get_integer(&self, value: &RespValue) -> Option<i64> {
        match value {
            RespValue::Integer(n) => Some(*n),
            RespValue::BulkString(b) => parse_i64(b),
            RespValue::SimpleString(s) => parse_i64(s.as_bytes()),
            _ => None,
        }
    }

    /// Extracts every argument as bytes.
    fn get_all_bytes(&self, values: &[RespValue]) -> Option<Vec<Bytes>> {
        values.iter().map(|v| self.get_bytes(v)).collect()
    }

    /// Groups `field value` arguments into pairs.
    fn get_pairs(&self, values: &[RespValue]) -> Option<Vec<(Bytes, Bytes)>> {
        values
            .chunks_exact(2)
            .map(|pair| Some((self.get_bytes(&pair[0])?, self.get_bytes(&pair[1])?)))
            .collect()
    }

    /// Parses a strictly positive TTL in seconds.
    fn get_ttl_secs(&self, value: &RespValue) -> Option<u64> {
        self.get_integer(value)
            .filter(|&secs| secs > 0)
            .map(|secs| secs as u64)
    }

    fn wrong_arity(cmd: &str) -> RespValue {
        RespValue::error(format!("ERR wrong number of arguments for '{}' command", cmd))
    }

    fn invalid_key() -> RespValue {
        RespValue::error("ERR invalid key")
    }

    fn not_an_integer() -> RespValue {
        RespValue::error("ERR value is not an integer or out of range")
    }

    // ========================================================================
    // Write Commands
    // ========================================================================

    /// HSET key field value [field value ...]
    fn cmd_hset(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 3 || args.len() % 2 == 0 {
            return Self::wrong_arity("HSET");
        }

        let Some(key) = self.get_bytes(&args[0]) else {
            return Self::invalid_key();
        };
        let Some(pairs) = self.get_pairs(&args[1..]) else {
            return RespValue::error("ERR invalid field or value");
        };

        RespValue::integer(self.storage.hset(key, pairs) as i64)
    }

    /// HMSET key field value [field value ...]
    fn cmd_hmset(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 3 || args.len() % 2 == 0 {
            return Self::wrong_arity("HMSET");
        }

        let Some(key) = self.get_bytes(&args[0]) else {
            return Self::invalid_key();
        };
        let Some(pairs) = self.get_pairs(&args[1..]) else {
            return RespValue::error("ERR invalid field or value");
        };

        self.storage.hset(key, pairs);
        RespValue::ok()
    }

    /// HSETNX key field value
    fn cmd_hsetnx(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 {
            return Self::wrong_arity("HSETNX");
        }

        let (Some(key), Some(field), Some(value)) = (
            self.get_bytes(&args[0]),
            self.get_bytes(&args[1]),
            self.get_bytes(&args[2]),
        ) else {
            return RespValue::error("ERR invalid argument");
        };

        RespValue::boolean(self.storage.hsetnx(key, field, value))
    }

    /// HSETEX key [NX] seconds field value [field value ...]
    fn cmd_hsetex(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 4 {
            return Self::wrong_arity("HSETEX");
        }

        let Some(key) = self.get_bytes(&args[0]) else {
            return Self::invalid_key();
        };

        let mut rest = &args[1..];
        let only_if_absent = self
            .get_string(&rest[0])
            .is_some_and(|opt| opt.eq_ignore_ascii_case("NX"));
        if only_if_absent {
            rest = &rest[1..];
        }

        // seconds, then at least one complete pair
        if rest.len() < 3 || rest.len() % 2 == 0 {
            return Self::wrong_arity("HSETEX");
        }

        let Some(ttl_secs) = self.get_ttl_secs(&rest[0]) else {
            return RespValue::error("ERR invalid expire time in 'HSETEX' command");
        };
        let Some(pairs) = self.get_pairs(&rest[1..]) else {
            return RespValue::error("ERR invalid field or value");
        };

        let created = self.storage.hsetex(key, pairs, ttl_secs, only_if_absent);
        RespValue::integer(created as i64)
    }

    /// HDEL key field [field ...]
    fn cmd_hdel(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return Self::wrong_arity("HDEL");
        }

        let Some(key) = self.get_bytes(&args[0]) else {
            return Self::invalid_key();
        };
        let Some(fields) = self.get_all_bytes(&args[1..]) else {
            return RespValue::error("ERR invalid field");
        };

        RespValue::integer(self.storage.hdel(&key, &fields) as i64)
    }

    /// HINCRBY key field increment
    fn cmd_hincrby(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 {
            return Self::wrong_arity("HINCRBY");
        }

        let (Some(key), Some(field)) = (self.get_bytes(&args[0]), self.get_bytes(&args[1])) else {
            return RespValue::error("ERR invalid argument");
        };
        let Some(delta) = self.get_integer(&args[2]) else {
            return Self::not_an_integer();
        };

        match self.storage.hincrby(key, field, delta) {
            Ok(n) => RespValue::integer(n),
            Err(e) => e.into(),
        }
    }

    /// HINCRBYFLOAT key field increment
    fn cmd_hincrbyfloat(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 {
            return Self::wrong_arity("HINCRBYFLOAT");
        }

        let (Some(key), Some(field)) = (self.get_bytes(&args[0]), self.get_bytes(&args[1])) else {
            return RespValue::error("ERR invalid argument");
        };
        let Some(delta) = self.get_bytes(&args[2]).and_then(|b| parse_f64(&b)) else {
            return RespValue::error("ERR value is not a valid float");
        };

        match self.storage.hincrbyfloat(key, field, delta) {
            Ok(value) => RespValue::bulk_string(value),
            Err(e) => e.into(),
        }
    }

    // ========================================================================
    // Read Commands
    // ========================================================================

    /// HGET key field
    fn cmd_hget(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return Self::wrong_arity("HGET");
        }

        let (Some(key), Some(field)) = (self.get_bytes(&args[0]), self.get_bytes(&args[1])) else {
            return RespValue::error("ERR invalid argument");
        };

        RespValue::optional_bulk(self.storage.hget(&key, &field))
    }

    /// HMGET key field [field ...]
    fn cmd_hmget(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return Self::wrong_arity("HMGET");
        }

        let Some(key) = self.get_bytes(&args[0]) else {
            return Self::invalid_key();
        };
        let Some(fields) = self.get_all_bytes(&args[1..]) else {
            return RespValue::error("ERR invalid field");
        };

        RespValue::array(
            self.storage
                .hmget(&key, &fields)
                .into_iter()
                .map(RespValue::optional_bulk)
                .collect(),
        )
    }

    /// HGETALL key
    fn cmd_hgetall(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return Self::wrong_arity("HGETALL");
        }
        match self.get_bytes(&args[0]) {
            Some(key) => RespValue::flat_pairs(self.storage.hgetall(&key)),
            None => Self::invalid_key(),
        }
    }

    /// HKEYS key
    fn cmd_hkeys(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return Self::wrong_arity("HKEYS");
        }
        match self.get_bytes(&args[0]) {
            Some(key) => RespValue::bulk_array(self.storage.hkeys(&key)),
            None => Self::invalid_key(),
        }
    }

    /// HVALS key
    fn cmd_hvals(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return Self::wrong_arity("HVALS");
        }
        match self.get_bytes(&args[0]) {
            Some(key) => RespValue::bulk_array(self.storage.hvals(&key)),
            None => Self::invalid_key(),
        }
    }

    /// HLEN key
    fn cmd_hlen(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return Self::wrong_arity("HLEN");
        }
        match self.get_bytes(&args[0]) {
            Some(key) => RespValue::integer(self.storage.hlen(&key) as i64),
            None => Self::invalid_key(),
        }
    }

    /// HSTRLEN key field
    fn cmd_hstrlen(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return Self::wrong_arity("HSTRLEN");
        }

        let (Some(key), Some(field)) = (self.get_bytes(&args[0]), self.get_bytes(&args[1])) else {
            return RespValue::error("ERR invalid argument");
        };

        RespValue::integer(self.storage.hstrlen(&key, &field) as i64)
    }

    /// HEXISTS key field
    fn cmd_hexists(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return Self::wrong_arity("HEXISTS");
        }

        let (Some(key), Some(field)) = (self.get_bytes(&args[0]), self.get_bytes(&args[1])) else {
            return RespValue::error("ERR invalid argument");
        };

        RespValue::boolean(self.storage.hexists(&key, &field))
    }

    /// HRANDFIELD key [count [WITHVALUES]]
    fn cmd_hrandfield(&self, args: &[RespValue]) -> RespValue {
        if args.is_empty() || args.len() > 3 {
            return Self::wrong_arity("HRANDFIELD");
        }

        let Some(key) = self.get_bytes(&args[0]) else {
            return Self::invalid_key();
        };

        let Some(count_arg) = args.get(1) else {
            return RespValue::optional_bulk(self.storage.hrandfield(&key));
        };

        let Some(count) = self.get_integer(count_arg) else {
            return Self::not_an_integer();
        };
        if !(-MAX_RANDFIELD_COUNT..=MAX_RANDFIELD_COUNT).contains(&count) {
            return RespValue::error("ERR value is out of range");
        }

        let with_values = match args.get(2) {
            None => false,
            Some(opt) => match self.get_string(opt) {
                Some(s) if s.eq_ignore_ascii_case("WITHVALUES") => true,
                _ => return RespValue::error("ERR syntax error"),
            },
        };

        let picked = self.storage.hrandfield_count(&key, count);
        if with_values {
            RespValue::flat_pairs(picked)
        } else {
            RespValue::bulk_array(picked.into_iter().map(|(field, _)| field))
        }
    }

    /// HSCAN key cursor [MATCH pattern] [COUNT count] [NOVALUES]
    fn cmd_hscan(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return Self::wrong_arity("HSCAN");
        }

        let Some(key) = self.get_bytes(&args[0]) else {
            return Self::invalid_key();
        };
        let Some(cursor) = self
            .get_string(&args[1])
            .and_then(|s| s.parse::<u64>().ok())
        else {
            return RespValue::error("ERR invalid cursor");
        };

        let mut pattern: Option<GlobPattern> = None;
        let mut count = DEFAULT_SCAN_COUNT;
        let mut no_values = false;

        let mut i = 2;
        while i < args.len() {
            let opt = match self.get_string(&args[i]) {
                Some(s) => s.to_uppercase(),
                None => return RespValue::error("ERR syntax error"),
            };

            match opt.as_str() {
                "MATCH" => {
                    i += 1;
                    let Some(p) = args.get(i).and_then(|v| self.get_bytes(v)) else {
                        return RespValue::error("ERR syntax error");
                    };
                    pattern = Some(GlobPattern::new(p));
                }
                "COUNT" => {
                    i += 1;
                    count = match args.get(i).and_then(|v| self.get_integer(v)) {
                        Some(n) if n >= 1 => n as usize,
                        Some(_) => return RespValue::error("ERR syntax error"),
                        None => return Self::not_an_integer(),
                    };
                }
                "NOVALUES" => no_values = true,
                _ => return RespValue::error("ERR syntax error"),
            }
            i += 1;
        }

        let page = self.storage.hscan(&key, cursor, pattern.as_ref(), count);
        let entries = if no_values {
            RespValue::bulk_array(page.entries.into_iter().map(|(field, _)| field))
        } else {
            RespValue::flat_pairs(page.entries)
        };

        RespValue::array(vec![
            RespValue::bulk_string(Bytes::from(page.cursor.to_string())),
            entries,
        ])
    }

    // ========================================================================
    // Field TTL Commands
    // ========================================================================

    /// FIELDTTL key field
    fn cmd_fieldttl(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return Self::wrong_arity("FIELDTTL");
        }

        let (Some(key), Some(field)) = (self.get_bytes(&args[0]), self.get_bytes(&args[1])) else {
            return RespValue::error("ERR invalid argument");
        };

        let secs = match self.storage.field_ttl(&key, &field) {
            FieldTtl::Missing => -2,
            FieldTtl::Persistent => -1,
            // Rounded to the nearest second, like TTL
            FieldTtl::ExpiresIn(ms) => ((ms + 500) / 1000) as i64,
        };
        RespValue::integer(secs)
    }

    /// FIELDEXPIRE key seconds field [field ...]
    fn cmd_fieldexpire(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 3 {
            return Self::wrong_arity("FIELDEXPIRE");
        }

        let Some(key) = self.get_bytes(&args[0]) else {
            return Self::invalid_key();
        };
        // A TTL of 0 deletes the fields
        let ttl_secs = self
            .get_integer(&args[1])
            .and_then(|secs| u64::try_from(secs).ok());
        let Some(ttl_secs) = ttl_secs else {
            return RespValue::error("ERR invalid expire time in 'FIELDEXPIRE' command");
        };
        let Some(fields) = self.get_all_bytes(&args[2..]) else {
            return RespValue::error("ERR invalid field");
        };

        RespValue::array(
            self.storage
                .field_expire(&key, ttl_secs, &fields)
                .into_iter()
                .map(RespValue::boolean)
                .collect(),
        )
    }

    /// HPERSIST key field [field ...]
    fn cmd_hpersist(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return Self::wrong_arity("HPERSIST");
        }

        let Some(key) = self.get_bytes(&args[0]) else {
            return Self::invalid_key();
        };
        let Some(fields) = self.get_all_bytes(&args[1..]) else {
            return RespValue::error("ERR invalid field");
        };

        RespValue::array(
            self.storage
                .hpersist(&key, &fields)
                .into_iter()
                .map(RespValue::boolean)
                .collect(),
        )
    }

    // ========================================================================
    // Key Commands
    // ========================================================================

    /// DEL key [key ...]
    fn cmd_del(&self, args: &[RespValue]) -> RespValue {
        if args.is_empty() {
            return Self::wrong_arity("DEL");
        }
        match self.get_all_bytes(args) {
            Some(keys) => RespValue::integer(self.storage.del(&keys) as i64),
            None => Self::invalid_key(),
        }
    }

    /// EXISTS key [key ...]
    fn cmd_exists(&self, args: &[RespValue]) -> RespValue {
        if args.is_empty() {
            return Self::wrong_arity("EXISTS");
        }
        match self.get_all_bytes(args) {
            Some(keys) => RespValue::integer(self.storage.exists(&keys) as i64),
            None => Self::invalid_key(),
        }
    }

    /// OBJECT ENCODING key
    fn cmd_object(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return Self::wrong_arity("OBJECT");
        }

        let is_encoding = self
            .get_string(&args[0])
            .is_some_and(|sub| sub.eq_ignore_ascii_case("ENCODING"));
        if !is_encoding {
            return RespValue::error("ERR unknown subcommand for 'OBJECT'");
        }

        let Some(key) = self.get_bytes(&args[1]) else {
            return Self::invalid_key();
        };
        match self.storage.object_encoding(&key) {
            Some(kind) => RespValue::bulk_string(Bytes::from_static(kind.as_str().as_bytes())),
            None => RespValue::null(),
        }
    }
}
