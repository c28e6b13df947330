//! Target address type.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use crate::error::{InsightError, InsightResult};

/// Address in the target's 64-bit virtual address space
///
/// The value is stored as a single `u64` but is also exposed as two 32-bit
/// half-words, `high` and `low`. Kernel data structures often keep flag bits
/// in the low word of a pointer, and clearing them is naturally expressed as a
/// half-word update. At all times `value() == high() * 2^32 + low()`.
///
/// ## Arithmetic
///
/// All arithmetic is modular. Adding past `0xffff_ffff_ffff_ffff` wraps to
/// zero and going below zero wraps to the maximum. Address arithmetic never
/// fails; whether the result can be read is only decided when memory is
/// accessed.
///
/// ## Example
///
/// ```rust
/// use kinsight_core::types::Address;
///
/// let addr = Address::new(0x0000_0000_ffff_fffe);
/// assert_eq!(addr.add_signed(2).value(), 0x0000_0001_0000_0000);
/// assert_eq!(Address::ZERO.add_signed(-1), Address::MAX);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// The highest representable address
    pub const MAX: Self = Address(u64::MAX);

    /// Create a new address from a `u64` value
    ///
    /// ```rust
    /// use kinsight_core::types::Address;
    ///
    /// const DIRECT_MAP: Address = Address::new(0xffff_8800_0000_0000);
    /// assert_eq!(DIRECT_MAP.high(), 0xffff_8800);
    /// ```
    #[must_use]
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Raw `u64` value of this address
    #[must_use]
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Upper 32 bits
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn high(self) -> u32
    {
        (self.0 >> 32) as u32
    }

    /// Lower 32 bits
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn low(self) -> u32
    {
        self.0 as u32
    }

    /// Replace the upper 32 bits, keeping the lower half.
    pub fn set_high(&mut self, high: u32)
    {
        self.0 = (u64::from(high) << 32) | u64::from(self.low());
    }

    /// Replace the lower 32 bits, keeping the upper half.
    pub fn set_low(&mut self, low: u32)
    {
        self.0 = (u64::from(self.high()) << 32) | u64::from(low);
    }

    /// Copy of this address with the upper 32 bits replaced
    #[must_use]
    pub fn with_high(mut self, high: u32) -> Self
    {
        self.set_high(high);
        self
    }

    /// Copy of this address with the lower 32 bits replaced
    #[must_use]
    pub fn with_low(mut self, low: u32) -> Self
    {
        self.set_low(low);
        self
    }

    /// Add a signed offset with two's-complement wraparound at 2^64
    ///
    /// A carry out of the low word propagates into the high word and a borrow
    /// is taken from it, exactly like native 64-bit arithmetic.
    ///
    /// ```rust
    /// use kinsight_core::types::Address;
    ///
    /// assert_eq!(Address::MAX.add_signed(1), Address::ZERO);
    /// assert_eq!(Address::new(0x1_0000_0000).add_signed(-1).value(), 0xffff_ffff);
    /// ```
    #[must_use]
    pub const fn add_signed(self, offset: i64) -> Self
    {
        Address(self.0.wrapping_add_signed(offset))
    }

    /// Whether this is the null address. Never reads memory.
    #[must_use]
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Zero-padded hexadecimal form with a `0x` prefix
    ///
    /// The output is accepted by [`Address::parse`], so the two round-trip.
    #[must_use]
    pub fn to_hex_string(self) -> String
    {
        format!("0x{:016x}", self.0)
    }

    /// Parse a decimal or hexadecimal address
    ///
    /// - `0x` / `0X` prefixed strings are hexadecimal
    /// - strings made only of decimal digits are decimal
    /// - anything else made of hex digits (`ffff880001800000`) is hexadecimal
    ///
    /// Surrounding whitespace is ignored. Empty input, stray characters and
    /// values wider than 64 bits are rejected with `InsightError::Parse`.
    ///
    /// ```rust
    /// use kinsight_core::types::Address;
    ///
    /// assert_eq!(Address::parse("4096").unwrap().value(), 0x1000);
    /// assert_eq!(Address::parse("0x1000").unwrap().value(), 0x1000);
    /// assert_eq!(Address::parse("ffff880001800000").unwrap().value(), 0xffff_8800_0180_0000);
    /// assert!(Address::parse("0xfoo").is_err());
    /// ```
    pub fn parse(text: &str) -> InsightResult<Self>
    {
        let trimmed = text.trim();
        if let Some(digits) = strip_hex_prefix(trimmed) {
            return parse_radix(text, digits, 16);
        }
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return parse_radix(text, trimmed, 10);
        }
        parse_radix(text, trimmed, 16)
    }

    /// Parse a hexadecimal address, with or without a `0x` prefix.
    pub fn parse_hex(text: &str) -> InsightResult<Self>
    {
        let trimmed = text.trim();
        let digits = strip_hex_prefix(trimmed).unwrap_or(trimmed);
        parse_radix(text, digits, 16)
    }
}

fn strip_hex_prefix(text: &str) -> Option<&str>
{
    text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
}

fn parse_radix(input: &str, digits: &str, radix: u32) -> InsightResult<Address>
{
    if digits.is_empty() {
        return Err(InsightError::parse(input, "no digits"));
    }
    if let Some(bad) = digits.chars().find(|c| !c.is_digit(radix)) {
        return Err(InsightError::parse(input, format!("unexpected character '{bad}'")));
    }
    u64::from_str_radix(digits, radix)
        .map(Address)
        .map_err(|_| InsightError::parse(input, "value does not fit into 64 bits"))
}

impl FromStr for Address
{
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        Address::parse(s)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
