//! Compact Hash Encoding
//!
//! Small hashes live in a single contiguous byte buffer. Entries are packed
//! back to back in insertion order:
//!
//! ```text
//! ┌────────────┬───────┬────────────┬───────┬─────┬──────────────────┐
//! │ varint len │ field │ varint len │ value │ tag │ expire_at (u64)  │
//! └────────────┴───────┴────────────┴───────┴─────┴──────────────────┘
//!                                             0 = no TTL, 1 = 8 bytes follow
//! ```
//!
//! Every operation is a linear walk over the buffer. That is only acceptable
//! while the hash stays under the compact thresholds in
//! [`HashConfig`](crate::hash::HashConfig); the hash object promotes to the
//! expanded encoding as soon as they are crossed.

use crate::hash::entry::SetOutcome;
use std::ops::Range;

const TAG_PERSISTENT: u8 = 0;
const TAG_EXPIRING: u8 = 1;

/// A borrowed view of one packed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListpackEntry<'a> {
    pub field: &'a [u8],
    pub value: &'a [u8],
    pub expire_at: Option<u64>,
}

/// Densely packed (field, value, expiry) sequence.
#[derive(Debug, Clone, Default)]
pub struct Listpack {
    buf: Vec<u8>,
    len: usize,
    /// Number of entries carrying a TTL
    expiring: usize,
}

/// Position of an entry inside the buffer.
struct Located {
    span: Range<usize>,
    expire_at: Option<u64>,
}

impl Listpack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the packed buffer in bytes.
    #[inline]
    pub fn bytes(&self) -> usize {
        self.buf.len()
    }

    /// Number of entries that carry a TTL.
    #[inline]
    pub fn expiring_len(&self) -> usize {
        self.expiring
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            buf: &self.buf,
            pos: 0,
        }
    }

    /// Finds a field by linear scan.
    pub fn get(&self, field: &[u8]) -> Option<ListpackEntry<'_>> {
        self.iter().find(|entry| entry.field == field)
    }

    /// Returns the entry at a position in insertion order.
    pub fn nth(&self, index: usize) -> Option<ListpackEntry<'_>> {
        self.iter().nth(index)
    }

    /// Inserts or overwrites a field.
    ///
    /// An overwrite that does not grow the encoded entry is rewritten in
    /// place; a growing one is removed and re-appended at the end.
    pub fn set(&mut self, field: &[u8], value: &[u8], expire_at: Option<u64>) -> SetOutcome {
        let encoded_len = encoded_len(field, value, expire_at);

        let outcome = match self.locate(field) {
            Some(found) => {
                if found.expire_at.is_some() {
                    self.expiring -= 1;
                }

                if encoded_len <= found.span.len() {
                    let mut encoded = Vec::with_capacity(encoded_len);
                    encode_entry(&mut encoded, field, value, expire_at);
                    let start = found.span.start;
                    self.buf[start..start + encoded_len].copy_from_slice(&encoded);
                    self.buf.drain(start + encoded_len..found.span.end);
                } else {
                    self.buf.drain(found.span);
                    encode_entry(&mut self.buf, field, value, expire_at);
                }
                SetOutcome::Updated
            }
            None => {
                encode_entry(&mut self.buf, field, value, expire_at);
                self.len += 1;
                SetOutcome::Inserted
            }
        };

        if expire_at.is_some() {
            self.expiring += 1;
        }
        outcome
    }

    /// Removes a field, closing the gap it leaves.
    pub fn remove(&mut self, field: &[u8]) -> bool {
        match self.locate(field) {
            Some(found) => {
                self.buf.drain(found.span);
                self.len -= 1;
                if found.expire_at.is_some() {
                    self.expiring -= 1;
                }
                true
            }
            None => false,
        }
    }

    /// Keeps only the entries for which `keep` returns true.
    ///
    /// Kept entries are shifted down in place; nothing is allocated. Returns
    /// the number of removed entries.
    pub fn retain(&mut self, mut keep: impl FnMut(&ListpackEntry<'_>) -> bool) -> usize {
        let (mut read, mut write) = (0, 0);
        let mut removed = 0;

        while read < self.buf.len() {
            let (entry, end) = decode_entry(&self.buf, read);
            let has_ttl = entry.expire_at.is_some();
            if keep(&entry) {
                if write != read {
                    self.buf.copy_within(read..end, write);
                }
                write += end - read;
            } else {
                removed += 1;
                if has_ttl {
                    self.expiring -= 1;
                }
            }
            read = end;
        }

        self.buf.truncate(write);
        self.len -= removed;
        removed
    }

    fn locate(&self, field: &[u8]) -> Option<Located> {
        let mut pos = 0;
        while pos < self.buf.len() {
            let (entry, end) = decode_entry(&self.buf, pos);
            if entry.field == field {
                return Some(Located {
                    span: pos..end,
                    expire_at: entry.expire_at,
                });
            }
            pos = end;
        }
        None
    }
}

/// Iterator over packed entries in insertion order.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = ListpackEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let (entry, end) = decode_entry(self.buf, self.pos);
        self.pos = end;
        Some(entry)
    }
}

fn varint_len(mut n: usize) -> usize {
    let mut len = 1;
    while n >= 0x80 {
        n >>= 7;
        len += 1;
    }
    len
}

fn write_varint(buf: &mut Vec<u8>, mut n: usize) {
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

fn read_varint(buf: &[u8], pos: &mut usize) -> usize {
    let mut n = 0usize;
    let mut shift = 0;
    loop {
        let byte = buf[*pos];
        *pos += 1;
        n |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            return n;
        }
        shift += 7;
    }
}

fn encoded_len(field: &[u8], value: &[u8], expire_at: Option<u64>) -> usize {
    varint_len(field.len())
        + field.len()
        + varint_len(value.len())
        + value.len()
        + 1
        + if expire_at.is_some() { 8 } else { 0 }
}

fn encode_entry(buf: &mut Vec<u8>, field: &[u8], value: &[u8], expire_at: Option<u64>) {
    write_varint(buf, field.len());
    buf.extend_from_slice(field);
    write_varint(buf, value.len());
    buf.extend_from_slice(value);
    match expire_at {
        Some(exp) => {
            buf.push(TAG_EXPIRING);
            buf.extend_from_slice(&exp.to_le_bytes());
        }
        None => buf.push(TAG_PERSISTENT),
    }
}

/// Decodes the entry starting at `start`, returning it and the offset just past it.
fn decode_entry(buf: &[u8], start: usize) -> (ListpackEntry<'_>, usize) {
    let mut pos = start;

    let field_len = read_varint(buf, &mut pos);
    let field = &buf[pos..pos + field_len];
    pos += field_len;

    let value_len = read_varint(buf, &mut pos);
    let value = &buf[pos..pos + value_len];
    pos += value_len;

    let tag = buf[pos];
    pos += 1;

    let expire_at = if tag == TAG_EXPIRING {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&buf[pos..pos + 8]);
        pos += 8;
        Some(u64::from_le_bytes(raw))
    } else {
        None
    };

    (
        ListpackEntry {
            field,
            value,
            expire_at,
        },
        pos,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(lp: &Listpack) -> Vec<&[u8]> {
        lp.iter().map(|e| e.field).collect()
    }

    #[test]
    fn test_set_and_get() {
        let mut lp = Listpack::new();

        assert_eq!(lp.set(b"a", b"1", None), SetOutcome::Inserted);
        assert_eq!(lp.set(b"b", b"2", Some(42)), SetOutcome::Inserted);
        assert_eq!(lp.len(), 2);
        assert_eq!(lp.expiring_len(), 1);

        let a = lp.get(b"a").unwrap();
        assert_eq!(a.value, b"1");
        assert_eq!(a.expire_at, None);

        let b = lp.get(b"b").unwrap();
        assert_eq!(b.value, b"2");
        assert_eq!(b.expire_at, Some(42));

        assert!(lp.get(b"c").is_none());
    }

    #[test]
    fn test_empty_field_and_value() {
        let mut lp = Listpack::new();
        lp.set(b"", b"565323349817", None);
        lp.set(b"x", b"", None);

        assert_eq!(lp.get(b"").unwrap().value, b"565323349817");
        assert_eq!(lp.get(b"x").unwrap().value, b"");
    }

    #[test]
    fn test_update_in_place_keeps_position() {
        let mut lp = Listpack::new();
        lp.set(b"a", b"long-value", None);
        lp.set(b"b", b"2", None);
        lp.set(b"c", b"3", None);
        let before = lp.bytes();

        assert_eq!(lp.set(b"a", b"short", None), SetOutcome::Updated);
        assert_eq!(fields(&lp), vec![&b"a"[..], b"b", b"c"]);
        assert_eq!(lp.get(b"a").unwrap().value, b"short");
        assert_eq!(lp.bytes(), before - 5);
        assert_eq!(lp.len(), 3);
    }

    #[test]
    fn test_growing_update_moves_to_end() {
        let mut lp = Listpack::new();
        lp.set(b"a", b"1", None);
        lp.set(b"b", b"2", None);

        lp.set(b"a", b"much longer value", None);
        assert_eq!(fields(&lp), vec![&b"b"[..], b"a"]);
        assert_eq!(lp.get(b"a").unwrap().value, b"much longer value");
        assert_eq!(lp.len(), 2);
    }

    #[test]
    fn test_update_adds_and_drops_ttl() {
        let mut lp = Listpack::new();
        lp.set(b"a", b"1", None);
        lp.set(b"a", b"1", Some(100));
        assert_eq!(lp.expiring_len(), 1);
        assert_eq!(lp.get(b"a").unwrap().expire_at, Some(100));

        lp.set(b"a", b"1", None);
        assert_eq!(lp.expiring_len(), 0);
        assert_eq!(lp.get(b"a").unwrap().expire_at, None);
    }

    #[test]
    fn test_remove_compacts() {
        let mut lp = Listpack::new();
        lp.set(b"a", b"1", None);
        lp.set(b"b", b"2", Some(7));
        lp.set(b"c", b"3", None);

        assert!(lp.remove(b"b"));
        assert!(!lp.remove(b"b"));
        assert_eq!(fields(&lp), vec![&b"a"[..], b"c"]);
        assert_eq!(lp.expiring_len(), 0);

        let mut expected = Listpack::new();
        expected.set(b"a", b"1", None);
        expected.set(b"c", b"3", None);
        assert_eq!(lp.bytes(), expected.bytes());
    }

    #[test]
    fn test_long_values_use_multibyte_lengths() {
        let mut lp = Listpack::new();
        let medium = vec![b'm'; 300];
        let large = vec![b'l'; 20_000];

        lp.set(b"medium", &medium, None);
        lp.set(b"large", &large, Some(9));
        lp.set(b"tail", b"t", None);

        assert_eq!(lp.get(b"medium").unwrap().value, &medium[..]);
        assert_eq!(lp.get(b"large").unwrap().value, &large[..]);
        assert_eq!(lp.get(b"tail").unwrap().value, b"t");
    }

    #[test]
    fn test_retain() {
        let mut lp = Listpack::new();
        for i in 0..10u64 {
            lp.set(format!("f{}", i).as_bytes(), b"v", Some(i));
        }

        let removed = lp.retain(|e| e.expire_at.map(|exp| exp >= 5).unwrap_or(true));
        assert_eq!(removed, 5);
        assert_eq!(lp.len(), 5);
        assert_eq!(lp.expiring_len(), 5);
        assert!(lp.get(b"f4").is_none());
        assert!(lp.get(b"f5").is_some());
    }

    #[test]
    fn test_retain_compacts_in_place() {
        let mut lp = Listpack::new();
        lp.set(b"a", b"1", Some(1));
        lp.set(b"b", b"2", None);
        lp.set(b"c", b"3", Some(3));
        lp.set(b"d", b"4", None);
        let buf = lp.buf.as_ptr();
        let capacity = lp.buf.capacity();

        assert_eq!(lp.retain(|_| true), 0);
        assert_eq!(lp.buf.as_ptr(), buf);

        assert_eq!(lp.retain(|e| e.expire_at.is_none()), 2);
        assert_eq!(fields(&lp), vec![&b"b"[..], b"d"]);
        assert_eq!(lp.get(b"d").unwrap().value, b"4");
        assert_eq!(lp.expiring_len(), 0);
        assert_eq!(lp.buf.as_ptr(), buf);
        assert_eq!(lp.buf.capacity(), capacity);

        let mut expected = Listpack::new();
        expected.set(b"b", b"2", None);
        expected.set(b"d", b"4", None);
        assert_eq!(lp.bytes(), expected.bytes());
    }

    #[test]
    fn test_nth() {
        let mut lp = Listpack::new();
        lp.set(b"a", b"1", None);
        lp.set(b"b", b"2", None);

        assert_eq!(lp.nth(1).unwrap().field, b"b");
        assert!(lp.nth(2).is_none());
    }
}
