//! # RISC-V Page Tables
//!
//! Page-table translation layer for RV64 Sv39, Sv48 and Sv57.
//!
//! ## What you get
//! - A bit-exact [`PageTableEntry`] and the 4 KiB, 512-entry [`PageTable`].
//! - A [`ProtectionModel`] that turns VM access flags into entry bits, with
//!   the standard, Svpbmt and T-Head memory-type encodings.
//! - A pure [`codec`] between `(frame, protection)` and entries, and
//!   [`SwapEntry`] for non-present entries that name a swap slot.
//! - [`EntryOps`], the ordered single-entry transitions (install, clear,
//!   accessed/dirty/write harvesting) with their fences.
//! - [`AddressSpace`], the concurrent walker with lazy table allocation.
//! - An optional [`PageTableCheck`] observer, e.g. [`RefCountCheck`].
//!
//! ## Sv39/Sv48/Sv57 Virtual Address → Physical Address Walk
//!
//! Each level consumes 9 bits of the virtual address above the 12-bit page
//! offset:
//!
//! ```text
//! Sv57: | 56‒48 | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//!       |   L5  |   L4  |   L3  |   L2  |   L1  | Offset |
//! ```
//!
//! Sv48 starts at L4, Sv39 at L3. The unused upper bits must be copies of the
//! top VA bit (canonical form).
//!
//! ```text
//!  satp.PPN → L5 → L4 → L3 → L2 → L1 → Physical Page
//!                        │     │     └──► 4 KiB leaf
//!                        │     └────────► 2 MiB leaf
//!                        └──────────────► 1 GiB leaf
//! ```
//!
//! ### Leaf vs. non-leaf entries
//!
//! - An entry with `V=1` and any of `R/W/X` set is a **leaf**. At L2 and
//!   above it maps a huge page, and its frame must be aligned to that size.
//! - An entry with `V=1` and `R=W=X=0` points to the next-level table.
//! - An entry with `V=0` is ignored by hardware; software uses it for
//!   `PROT_NONE` hinting and swap entries.
//!
//! ### Entry layout
//!
//! ```text
//! | 63‒59   | 58‒54    | 53‒10 | 9    | 8       | 7 | 6 | 5 | 4 | 3 | 2 | 1 | 0 |
//! | memtype | reserved |  PPN  | soft | special | D | A | G | U | X | W | R | V |
//! ```
//!
//! ## Allocation
//!
//! Table memory comes from a [`TableAllocator`]. It hands out zeroed,
//! 4 KiB-aligned frames and knows how to reach them from the current address
//! space (identity map during boot, direct map later).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod address_space;
mod check;
pub mod codec;
mod config;
mod entry;
mod error;
mod prot;
mod satp;
pub mod swap;
mod sync;
mod table;
mod transition;

pub use crate::address_space::AddressSpace;
pub use crate::check::{
    CheckViolation, FrameKind, FrameMapCounts, FrameOwnership, NoCheck, PageTableCheck,
    RefCountCheck,
};
pub use crate::codec::{Decoded, Presence, decode, encode, encode_table, modify, try_encode};
pub use crate::config::{AddressSpaceConfig, PagingMode};
pub use crate::entry::{MAX_PFN, PFN_BITS, PFN_MASK, PFN_SHIFT, PageTableEntry};
pub use crate::error::{ConfigError, ContractViolation, TransitionError, WalkError};
pub use crate::prot::{MemoryModel, PageProt, ProtectionModel, VmFlags};
pub use crate::satp::{Asid, Satp};
pub use crate::swap::{MAX_SWAP_OFFSET, MAX_SWAP_TYPES, SwapEntry};
pub use crate::sync::{LocalHart, TlbSync};
pub use crate::table::{ENTRIES, EntryCell, Level, PageTable, Slot};
pub use crate::transition::EntryOps;

pub use kernel_memory_addresses::{PAGE_SHIFT, PAGE_SIZE, Pfn, PhysicalAddress, VirtualAddress};

/// Source of page-table frames.
///
/// Implementations decide where tables come from (a boot-time pool, the
/// general page allocator) and how a physical address becomes a pointer in
/// the current address space.
///
/// Returned tables **must** be 4 KiB aligned and zeroed.
pub trait TableAllocator {
    /// Allocate a zeroed table for `level`.
    ///
    /// `va_hint` is an address the table will translate; allocators may use
    /// it for placement. Returns `None` on out-of-memory.
    fn alloc_table(&self, level: Level, va_hint: VirtualAddress) -> Option<PhysicalAddress>;

    /// Give back a table that was never made reachable, or has been unlinked
    /// and fenced.
    fn free_table(&self, level: Level, pa: PhysicalAddress);

    /// View the table at `pa`.
    ///
    /// # Safety
    /// - `pa` must be a table handed out by this allocator (or the adopted
    ///   root) that has not been freed.
    /// - The mapping must stay valid for `'a`.
    unsafe fn table<'a>(&self, level: Level, pa: PhysicalAddress) -> &'a PageTable;
}

impl<T: TableAllocator + ?Sized> TableAllocator for &T {
    #[inline]
    fn alloc_table(&self, level: Level, va_hint: VirtualAddress) -> Option<PhysicalAddress> {
        (**self).alloc_table(level, va_hint)
    }

    #[inline]
    fn free_table(&self, level: Level, pa: PhysicalAddress) {
        (**self).free_table(level, pa);
    }

    #[inline]
    unsafe fn table<'a>(&self, level: Level, pa: PhysicalAddress) -> &'a PageTable {
        unsafe { (**self).table(level, pa) }
    }
}
