use crate::{PAGE_SIZE, align_down};
use core::fmt;
use core::ops::Add;

/// Virtual memory address.
///
/// Denotes a **virtual** address. It does not validate canonicality at
/// runtime; the paging mode decides which addresses are canonical, and the
/// page-table walker checks that before use.
///
/// ### Invariants
/// - No invariant beyond "this is intended to be a virtual address".
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0xFFFF_FFC0_8000_1234);
/// assert_eq!(va.align_down(PAGE_SIZE).as_u64(), 0xFFFF_FFC0_8000_1000);
/// assert_eq!(va.page_offset(), 0x234);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Offset within the 4 KiB page.
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u64 {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Round down to a multiple of `size` (a power of two).
    #[inline]
    #[must_use]
    pub const fn align_down(self, size: u64) -> Self {
        Self(align_down(self.0, size))
    }

    /// Offset within a region of `size` bytes (a power of two).
    #[inline]
    #[must_use]
    pub const fn offset_in(self, size: u64) -> u64 {
        self.0 & (size - 1)
    }

    /// Wrapping addition, for walking ranges that end at the top of the
    /// address space.
    #[inline]
    #[must_use]
    pub const fn wrapping_add(self, rhs: u64) -> Self {
        Self(self.0.wrapping_add(rhs))
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}
