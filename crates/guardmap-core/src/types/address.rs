//! Virtual address type.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use crate::error::GuardError;

/// Strongly typed virtual address in the inspected process
///
/// Wrapping `u64` keeps addresses from being mixed up with sizes and bitmap
/// offsets, which are plain `u64` values throughout this crate.
///
/// ## Parsing
///
/// Addresses are entered the way debuggers print them: hexadecimal with or
/// without a `0x` prefix, optionally split by a backtick between the high and
/// low halves.
///
/// ```rust
/// use guardmap_core::types::Address;
///
/// let a: Address = "0x7ff812340000".parse()?;
/// let b: Address = "00007ff8`12340000".parse()?;
/// assert_eq!(a, b);
/// assert_eq!(a + 0x200, Address::new(0x7ff8_1234_0200));
/// # Ok::<(), guardmap_core::error::GuardError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset to this address, checking for overflow
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Add an offset to this address, saturating at the maximum value
    pub fn saturating_add(self, offset: u64) -> Self
    {
        Address(self.0.saturating_add(offset))
    }

    /// Round down to a multiple of `alignment` (a power of two).
    #[must_use]
    pub const fn align_down(self, alignment: u64) -> Self
    {
        Address(self.0 & !(alignment - 1))
    }

    /// Distance in bytes from `origin` to this address, or `None` if this
    /// address lies below `origin`.
    pub fn offset_from(self, origin: Address) -> Option<u64>
    {
        self.0.checked_sub(origin.0)
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

impl FromStr for Address
{
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        parse_hex(s).map(Address)
    }
}

/// Parse a hexadecimal number the way debuggers print them.
///
/// Accepts an optional `0x`/`0X` prefix and backtick separators. Used for
/// addresses and for sizes on the command line.
///
/// ## Errors
///
/// `InvalidArgument` if the text is empty, contains non-hex digits or does
/// not fit in 64 bits.
pub fn parse_hex(text: &str) -> Result<u64, GuardError>
{
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .replace('`', "");

    if digits.is_empty() {
        return Err(GuardError::InvalidArgument(format!("expected a hex number, got '{text}'")));
    }

    u64::from_str_radix(&digits, 16)
        .map_err(|err| GuardError::InvalidArgument(format!("'{text}' is not a valid hex number: {err}")))
}
