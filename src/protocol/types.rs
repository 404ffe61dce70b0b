//! RESP reply values for hash commands.
//!
//! The command layer answers every hash command with one of these values.
//! Wire encoding follows RESP2:
//!
//! - `+` Simple String: `+OK\r\n`
//! - `-` Error: `-ERR hash value is not an integer\r\n`
//! - `:` Integer: `:2\r\n`
//! - `$` Bulk String: `$5\r\nhello\r\n`, nil is `$-1\r\n`
//! - `*` Array: `*2\r\n$1\r\nf\r\n$1\r\nv\r\n`

use crate::error::HashError;
use bytes::Bytes;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A value in the RESP protocol, used both for command arguments and replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Short status reply, e.g. `OK`. Must not contain CRLF.
    SimpleString(String),

    /// Error reply, prefixed with an error code such as `ERR`.
    Error(String),

    /// 64-bit signed integer.
    Integer(i64),

    /// Binary-safe string.
    BulkString(Bytes),

    /// Nil bulk string.
    Null,

    /// Ordered list of values.
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates an error reply.
    ///
    /// # Example
    /// ```
    /// use flashkv_hash::protocol::RespValue;
    /// let err = RespValue::error("ERR syntax error");
    /// assert!(err.is_error());
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Integer reply for a boolean outcome (1 or 0).
    pub fn boolean(flag: bool) -> Self {
        RespValue::Integer(i64::from(flag))
    }

    /// Bulk string, or nil when absent.
    pub fn optional_bulk(data: Option<Bytes>) -> Self {
        data.map_or(RespValue::Null, RespValue::BulkString)
    }

    /// Array of bulk strings.
    pub fn bulk_array(items: impl IntoIterator<Item = Bytes>) -> Self {
        RespValue::Array(items.into_iter().map(RespValue::BulkString).collect())
    }

    /// Flat `[field, value, field, value, ...]` array, as HGETALL replies.
    pub fn flat_pairs(pairs: impl IntoIterator<Item = (Bytes, Bytes)>) -> Self {
        RespValue::Array(
            pairs
                .into_iter()
                .flat_map(|(field, value)| [RespValue::BulkString(field), RespValue::BulkString(value)])
                .collect(),
        )
    }

    /// Serializes the value to its wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the value into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => write_line(buf, prefix::SIMPLE_STRING, s.as_bytes()),
            RespValue::Error(s) => write_line(buf, prefix::ERROR, s.as_bytes()),
            RespValue::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            RespValue::BulkString(data) => {
                write_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => write_line(buf, prefix::BULK_STRING, b"-1"),
            RespValue::Array(values) => {
                write_line(buf, prefix::ARRAY, values.len().to_string().as_bytes());
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Inner bytes of a bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

impl From<HashError> for RespValue {
    fn from(err: HashError) -> Self {
        RespValue::Error(format!("ERR {}", err))
    }
}

fn write_line(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.push(prefix);
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_serialize() {
        assert_eq!(RespValue::ok().serialize(), b"+OK\r\n");
        assert_eq!(RespValue::integer(-42).serialize(), b":-42\r\n");
        assert_eq!(RespValue::boolean(true).serialize(), b":1\r\n");
        assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
        assert_eq!(
            RespValue::bulk_string(Bytes::from("hello")).serialize(),
            b"$5\r\nhello\r\n"
        );
        assert_eq!(
            RespValue::bulk_string(Bytes::new()).serialize(),
            b"$0\r\n\r\n"
        );
    }

    #[test]
    fn test_error_from_hash_error() {
        let reply = RespValue::from(HashError::NotAnInteger);
        assert_eq!(reply.serialize(), b"-ERR hash value is not an integer\r\n");
    }

    #[test]
    fn test_flat_pairs() {
        let reply = RespValue::flat_pairs(vec![(Bytes::from("f"), Bytes::from("v"))]);
        assert_eq!(reply.serialize(), b"*2\r\n$1\r\nf\r\n$1\r\nv\r\n");
    }

    #[test]
    fn test_scan_reply_shape() {
        let reply = RespValue::array(vec![
            RespValue::bulk_string(Bytes::from("0")),
            RespValue::bulk_array(vec![Bytes::from("a")]),
        ]);
        assert_eq!(reply.serialize(), b"*2\r\n$1\r\n0\r\n*1\r\n$1\r\na\r\n");
    }

    #[test]
    fn test_optional_bulk() {
        assert!(RespValue::optional_bulk(None).is_null());
        assert_eq!(
            RespValue::optional_bulk(Some(Bytes::from("x"))).as_bytes(),
            Some(&b"x"[..])
        );
    }
}
