//! Code address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed address in the current process
///
/// Used for instruction pointers and faulting data addresses. Keeping them
/// apart from plain `u64` sizes avoids mixing up `base + size` arithmetic with
/// the address being looked up.
///
/// ## Example
///
/// ```rust
/// use faultline_core::types::Address;
///
/// let addr = Address::new(0x1000);
/// let next_addr = addr + 0x100;
/// assert_eq!(next_addr.value(), 0x1100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    ///
    /// Never inside a loaded module, so resolving it yields an empty name.
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Address of a pointer
    ///
    /// ## Example
    ///
    /// ```rust
    /// use faultline_core::types::Address;
    ///
    /// let value = 7_u32;
    /// let addr = Address::from_ptr(&value);
    /// assert_ne!(addr, Address::ZERO);
    /// ```
    pub fn from_ptr<T: ?Sized>(ptr: *const T) -> Self
    {
        Address(ptr.cast::<u8>() as usize as u64)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Whether this address is the null address
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Whether the address lies in the half-open range `[base, base + size)`
    ///
    /// A range that would overflow the address space is clamped at `u64::MAX`.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use faultline_core::types::Address;
    ///
    /// let base = Address::new(0x1000);
    /// assert!(Address::new(0x1000).within(base, 0x100));
    /// assert!(Address::new(0x10ff).within(base, 0x100));
    /// assert!(!Address::new(0x1100).within(base, 0x100));
    /// ```
    pub fn within(self, base: Address, size: u64) -> bool
    {
        self.0 >= base.0 && self.0 < base.0.saturating_add(size)
    }

    /// Distance between two addresses, regardless of order
    pub fn distance(self, other: Address) -> u64
    {
        self.0.abs_diff(other.0)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<usize> for Address
{
    fn from(value: usize) -> Self
    {
        Address(value as u64)
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
