//! Decoded scalar values.

use std::fmt;

use super::Address;

/// Value decoded from the bytes of a scalar or pointer instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue
{
    /// Signed integer or enumeration, sign-extended to 64 bits
    Signed(i64),
    /// Unsigned integer, zero-extended to 64 bits
    Unsigned(u64),
    /// Boolean (any non-zero byte pattern is `true`)
    Bool(bool),
    /// `float` or `double`
    Float(f64),
    /// Pointer value
    Pointer(Address),
}

impl ScalarValue
{
    /// Value as an unsigned integer, if it has a non-negative integral representation.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64>
    {
        match *self {
            ScalarValue::Signed(v) => u64::try_from(v).ok(),
            ScalarValue::Unsigned(v) => Some(v),
            ScalarValue::Bool(v) => Some(u64::from(v)),
            ScalarValue::Pointer(addr) => Some(addr.value()),
            ScalarValue::Float(_) => None,
        }
    }

    /// Value as a signed integer, if it fits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64>
    {
        match *self {
            ScalarValue::Signed(v) => Some(v),
            ScalarValue::Unsigned(v) => i64::try_from(v).ok(),
            ScalarValue::Bool(v) => Some(i64::from(v)),
            ScalarValue::Pointer(addr) => i64::try_from(addr.value()).ok(),
            ScalarValue::Float(_) => None,
        }
    }

    /// Pointer value, or an unsigned integer reinterpreted as an address.
    #[must_use]
    pub fn as_address(&self) -> Option<Address>
    {
        match *self {
            ScalarValue::Pointer(addr) => Some(addr),
            ScalarValue::Unsigned(v) => Some(Address::new(v)),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ScalarValue::Signed(v) => write!(f, "{v}"),
            ScalarValue::Unsigned(v) => write!(f, "{v}"),
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::Pointer(addr) => write!(f, "{addr}"),
        }
    }
}

/// Decode up to eight little-endian bytes into an unsigned integer.
pub(crate) fn decode_unsigned(bytes: &[u8]) -> u64
{
    bytes
        .iter()
        .take(8)
        .rev()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
}

/// Sign-extend the low `size` bytes of `raw`.
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
pub(crate) fn sign_extend(raw: u64, size: usize) -> i64
{
    if size == 0 || size >= 8 {
        return raw as i64;
    }
    let shift = 64 - 8 * (size as u32);
    ((raw << shift) as i64) >> shift
}
