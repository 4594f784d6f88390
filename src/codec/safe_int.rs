//! Overflow-checked 64-bit integers.
//!
//! 64-bit counters and versions are carried as JSON numbers, which most
//! consumers parse as IEEE doubles. [`SafeInt`] only admits values whose
//! magnitude is at most 2^53 − 1, so every value survives that trip exactly.
//! Anything wider is rejected where it enters the crate, never truncated.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProtostubError, Result};

/// Largest integer a double represents exactly, 2^53 − 1.
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Smallest integer a double represents exactly, −(2^53 − 1).
pub const MIN_SAFE_INTEGER: i64 = -MAX_SAFE_INTEGER;

/// 64-bit integer restricted to the safe range.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct SafeInt(i64);

impl SafeInt {
    /// Zero.
    pub const ZERO: SafeInt = SafeInt(0);
    /// Largest safe value.
    pub const MAX: SafeInt = SafeInt(MAX_SAFE_INTEGER);
    /// Smallest safe value.
    pub const MIN: SafeInt = SafeInt(MIN_SAFE_INTEGER);

    /// Wrap `value` if it is in range.
    pub const fn new(value: i64) -> Option<Self> {
        if value >= MIN_SAFE_INTEGER && value <= MAX_SAFE_INTEGER {
            Some(SafeInt(value))
        } else {
            None
        }
    }

    /// The wrapped value.
    #[inline]
    pub const fn get(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Interpret a decoded varint as a two's complement `int64`.
    pub fn from_wire_signed(raw: u64) -> Result<Self> {
        Self::try_from(raw as i64)
    }

    /// Interpret a decoded varint as a `uint64`.
    pub fn from_wire_unsigned(raw: u64) -> Result<Self> {
        Self::try_from(raw)
    }

    /// Value to write as a varint. Negative values are sign-extended.
    #[inline]
    pub const fn to_wire(self) -> u64 {
        self.0 as u64
    }

    /// Convert a JSON double, rejecting fractions and out-of-range values.
    pub fn from_f64(value: f64) -> Result<Self> {
        if !value.is_finite() || value.fract() != 0.0 {
            return Err(ProtostubError::InvalidJson(format!(
                "{value} is not an integer"
            )));
        }
        if value.abs() > MAX_SAFE_INTEGER as f64 {
            return Err(ProtostubError::IntegerOverflow(value as i128));
        }
        Ok(SafeInt(value as i64))
    }
}

impl TryFrom<i64> for SafeInt {
    type Error = ProtostubError;

    fn try_from(value: i64) -> Result<Self> {
        SafeInt::new(value).ok_or(ProtostubError::IntegerOverflow(i128::from(value)))
    }
}

impl TryFrom<u64> for SafeInt {
    type Error = ProtostubError;

    fn try_from(value: u64) -> Result<Self> {
        match i64::try_from(value) {
            Ok(signed) if signed <= MAX_SAFE_INTEGER => Ok(SafeInt(signed)),
            _ => Err(ProtostubError::IntegerOverflow(i128::from(value))),
        }
    }
}

impl From<i32> for SafeInt {
    fn from(value: i32) -> Self {
        SafeInt(i64::from(value))
    }
}

impl From<u32> for SafeInt {
    fn from(value: u32) -> Self {
        SafeInt(i64::from(value))
    }
}

impl From<SafeInt> for i64 {
    fn from(value: SafeInt) -> Self {
        value.0
    }
}

impl fmt::Display for SafeInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
