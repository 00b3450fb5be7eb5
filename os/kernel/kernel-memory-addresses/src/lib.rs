//! # Physical, Virtual and Frame Addresses
//!
//! Strongly typed wrappers for the three kinds of numbers the RISC-V paging
//! code juggles:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A byte address on the physical bus (RAM or MMIO). |
//! | [`VirtualAddress`] | A byte address translated by the page tables. |
//! | [`Pfn`] | A physical **frame number**, i.e. `PhysicalAddress >> 12`. |
//!
//! Page-table entries store frame numbers, not addresses, so the frame number
//! gets its own type instead of being a shifted `u64` floating around.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x8020_1234);
//! let pfn = pa.pfn();
//! assert_eq!(pfn.as_u64(), 0x80201);
//! assert_eq!(pfn.base().as_u64() + pa.page_offset(), pa.as_u64());
//! ```
//!
//! ## Design Notes
//!
//! - All types are `#[repr(transparent)]` over `u64` and `Copy`.
//! - Conversions are `const fn` so they can be used in static tables.
//! - The crate makes no claim about what range is *valid*; width checks live
//!   with the code that knows the hardware limits.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod pfn;
mod physical_address;
mod virtual_address;

pub use pfn::Pfn;
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// log2 of the base page size.
pub const PAGE_SHIFT: u32 = 12;

/// Base page size in bytes (4 KiB).
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Align `x` down to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two; this is not checked.
///
/// ```rust
/// # use kernel_memory_addresses::align_down;
/// assert_eq!(align_down(0x12345, 0x1000), 0x12000);
/// assert_eq!(align_down(0x2000, 0x1000), 0x2000);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u64, a: u64) -> u64 {
    x & !(a - 1)
}

/// Whether `x` is a multiple of `a` (a power of two).
#[inline(always)]
#[must_use]
pub const fn is_aligned(x: u64, a: u64) -> bool {
    x & (a - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_down(0, PAGE_SIZE), 0);
        assert_eq!(align_down(PAGE_SIZE - 1, PAGE_SIZE), 0);
        assert!(is_aligned(0x20_0000, 0x20_0000));
        assert!(!is_aligned(0x20_1000, 0x20_0000));
    }

    #[test]
    fn address_frame_round_trip() {
        let pa = PhysicalAddress::new(0x8765_4321);
        let pfn = pa.pfn();
        assert_eq!(pfn, Pfn::new(0x87654));
        assert_eq!(pfn.base(), PhysicalAddress::new(0x8765_4000));
        assert_eq!(pa.page_offset(), 0x321);
    }

    #[test]
    fn frame_arithmetic() {
        let pfn = Pfn::new(0x1000);
        assert_eq!((pfn + 0x200).as_u64(), 0x1200);
        assert_eq!(pfn.align_down(0x800), Pfn::new(0x1000));
        assert_eq!(Pfn::new(0x1234).align_down(0x200), Pfn::new(0x1200));
        assert!(pfn.is_aligned(0x200));
        assert!(!Pfn::new(0x1001).is_aligned(0x200));
    }
}
