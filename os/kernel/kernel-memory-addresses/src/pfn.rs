use crate::{PAGE_SHIFT, PhysicalAddress};
use core::fmt;
use core::ops::Add;

/// Physical frame number.
///
/// The index of a 4 KiB physical page: `pfn = physical_address >> 12`.
/// This is what RISC-V page-table entries store in their `PPN` field.
///
/// ### Notes
/// - Huge mappings reference their *first* frame; the frame must then be
///   aligned to the number of base pages the mapping covers.
/// - No width check is performed here; the paging code validates the frame
///   against the hardware's `PPN` width.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Pfn(u64);

impl Pfn {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Physical address of the first byte of this frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 << PAGE_SHIFT)
    }

    /// Align down to a multiple of `frames` (a power of two).
    #[inline]
    #[must_use]
    pub const fn align_down(self, frames: u64) -> Self {
        Self(self.0 & !(frames - 1))
    }

    /// Whether this frame is a multiple of `frames` (a power of two).
    #[inline]
    #[must_use]
    pub const fn is_aligned(self, frames: u64) -> bool {
        self.0 & (frames - 1) == 0
    }
}

impl fmt::Debug for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pfn({:#x})", self.0)
    }
}

impl fmt::Display for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Pfn {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for Pfn {
    #[inline]
    fn from(pa: PhysicalAddress) -> Self {
        pa.pfn()
    }
}

impl Add<u64> for Pfn {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}
