//! Timestamp conversion.
//!
//! On the wire a timestamp is a nested message `{seconds: int64 = 1,
//! nanos: int32 = 2}`. In memory it is a `DateTime<Utc>` at millisecond
//! resolution; sub-millisecond precision is dropped on the way in.
//!
//! Only 0001-01-01T00:00:00Z through 9999-12-31T23:59:59.999Z is accepted,
//! the range an RFC 3339 string can express.

use bytes::BufMut;
use chrono::{DateTime, SecondsFormat, Utc};

use super::safe_int::SafeInt;
use super::wire::{write_tag, write_varint, WireKind, WireReader};
use crate::error::{ProtostubError, Result};

const SECONDS_FIELD: u32 = 1;
const NANOS_FIELD: u32 = 2;
const NANOS_PER_MILLI: i64 = 1_000_000;
const MAX_NANOS: i32 = 999_999_999;

/// Seconds of 0001-01-01T00:00:00Z.
pub const MIN_SECONDS: i64 = -62_135_596_800;
/// Seconds of 9999-12-31T23:59:59Z.
pub const MAX_SECONDS: i64 = 253_402_300_799;

/// Wire representation of a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamp {
    /// Whole seconds since the Unix epoch.
    pub seconds: i64,
    /// Non-negative nanoseconds within the second.
    pub nanos: i32,
}

impl Timestamp {
    /// Convert through milliseconds. `nanos` stays non-negative for
    /// instants before the epoch.
    pub fn from_datetime(value: &DateTime<Utc>) -> Self {
        let millis = value.timestamp_millis();
        Self {
            seconds: millis.div_euclid(1000),
            nanos: (millis.rem_euclid(1000) * NANOS_PER_MILLI) as i32,
        }
    }

    /// Convert to a date-time, truncating to milliseconds.
    pub fn to_datetime(&self) -> Result<DateTime<Utc>> {
        if !(MIN_SECONDS..=MAX_SECONDS).contains(&self.seconds) {
            return Err(ProtostubError::Timestamp(format!(
                "{} seconds is out of range",
                self.seconds
            )));
        }
        if !(0..=MAX_NANOS).contains(&self.nanos) {
            return Err(ProtostubError::Timestamp(format!(
                "{} nanos is out of range",
                self.nanos
            )));
        }
        let millis = self.seconds * 1000 + i64::from(self.nanos) / NANOS_PER_MILLI;
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| ProtostubError::Timestamp(format!("{millis} ms is out of range")))
    }

    /// Write the two fields, eliding zeros.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        if self.seconds != 0 {
            write_tag(buf, SECONDS_FIELD, WireKind::Varint);
            write_varint(buf, self.seconds as u64);
        }
        if self.nanos != 0 {
            write_tag(buf, NANOS_FIELD, WireKind::Varint);
            write_varint(buf, i64::from(self.nanos) as u64);
        }
    }

    /// Read a timestamp body. Unknown fields are skipped; `seconds` must be
    /// within the safe integer range.
    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let mut out = Timestamp::default();
        while !reader.is_empty() {
            let tag = reader.read_tag()?;
            match (tag.field_number, tag.wire_kind) {
                (SECONDS_FIELD, WireKind::Varint) => {
                    out.seconds = SafeInt::from_wire_signed(reader.read_varint()?)?.get();
                }
                (NANOS_FIELD, WireKind::Varint) => {
                    out.nanos = reader.read_varint()? as i32;
                }
                _ => reader.skip_field(tag)?,
            }
        }
        Ok(out)
    }
}

/// Drop everything below one millisecond.
pub fn truncate_to_millis(value: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or(value)
}

/// RFC 3339 with millisecond precision and a `Z` suffix.
pub fn to_json_string(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 string in any offset, normalized to UTC milliseconds.
pub fn parse_json_string(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|parsed| truncate_to_millis(parsed.with_timezone(&Utc)))
        .map_err(|e| ProtostubError::Timestamp(format!("'{text}': {e}")))
}
