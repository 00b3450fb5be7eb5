//! # Table Levels
//!
//! Every level of the RISC-V radix tree is the same 4 KiB table of 512
//! entries; only the virtual-address bits used as the index differ:
//!
//! ```text
//! | 56‒48 | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |   L5  |   L4  |   L3  |   L2  |   L1  | Offset |
//! ```
//!
//! Sv39 starts the walk at L3, Sv48 at L4 and Sv57 at L5. A leaf above L1
//! maps 2 MiB (L2), 1 GiB (L3), 512 GiB (L4) or 256 TiB (L5).
//!
//! Entries are stored in [`EntryCell`]s so that walkers on other harts never
//! see a torn word: every read or write of an entry is one atomic access.

use crate::PageTableEntry;
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_memory_addresses::{PAGE_SHIFT, VirtualAddress};

/// Entries per table.
pub const ENTRIES: usize = 512;

/// Virtual-address bits consumed per level.
const INDEX_BITS: u32 = 9;

/// A level of the page-table tree. `L1` holds only 4 KiB leaves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    L1 = 1,
    L2 = 2,
    L3 = 3,
    L4 = 4,
    L5 = 5,
}

impl Level {
    #[must_use]
    pub const fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::L1),
            2 => Some(Self::L2),
            3 => Some(Self::L3),
            4 => Some(Self::L4),
            5 => Some(Self::L5),
            _ => None,
        }
    }

    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Position of this level's index in a virtual address.
    #[must_use]
    pub const fn shift(self) -> u32 {
        PAGE_SHIFT + INDEX_BITS * (self as u32 - 1)
    }

    /// Bytes mapped by one leaf at this level.
    #[must_use]
    pub const fn page_size(self) -> u64 {
        1 << self.shift()
    }

    /// 4 KiB pages covered by one leaf at this level.
    #[must_use]
    pub const fn pages(self) -> u64 {
        1 << (INDEX_BITS * (self as u32 - 1))
    }

    /// Index into a table of this level for `va`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(self, va: VirtualAddress) -> usize {
        ((va.as_u64() >> self.shift()) as usize) & (ENTRIES - 1)
    }

    /// The level a table pointer at this level leads to.
    #[must_use]
    pub const fn next_lower(self) -> Option<Self> {
        match self {
            Self::L1 => None,
            Self::L2 => Some(Self::L1),
            Self::L3 => Some(Self::L2),
            Self::L4 => Some(Self::L3),
            Self::L5 => Some(Self::L4),
        }
    }
}

/// One atomically accessed page-table entry.
#[repr(transparent)]
pub struct EntryCell(AtomicU64);

impl EntryCell {
    #[must_use]
    pub const fn empty() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    #[must_use]
    pub fn load(&self) -> PageTableEntry {
        PageTableEntry::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn store(&self, e: PageTableEntry) {
        self.0.store(e.into_bits(), Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn swap(&self, e: PageTableEntry) -> PageTableEntry {
        PageTableEntry::from_bits(self.0.swap(e.into_bits(), Ordering::SeqCst))
    }

    /// Install `new` if the cell still holds `current`; on failure return
    /// what is there instead.
    #[inline]
    pub(crate) fn compare_exchange(
        &self,
        current: PageTableEntry,
        new: PageTableEntry,
    ) -> Result<PageTableEntry, PageTableEntry> {
        self.0
            .compare_exchange(
                current.into_bits(),
                new.into_bits(),
                Ordering::SeqCst,
                Ordering::Acquire,
            )
            .map(PageTableEntry::from_bits)
            .map_err(PageTableEntry::from_bits)
    }

    /// Clear `bits` and return the word before the clear.
    #[inline]
    pub(crate) fn fetch_clear(&self, bits: u64) -> PageTableEntry {
        PageTableEntry::from_bits(self.0.fetch_and(!bits, Ordering::SeqCst))
    }
}

impl core::fmt::Debug for EntryCell {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "EntryCell({:#018x})", self.load().into_bits())
    }
}

/// A 4 KiB page table at any level.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [EntryCell; ENTRIES],
}

impl PageTable {
    /// An all-empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [const { EntryCell::empty() }; ENTRIES],
        }
    }

    #[inline]
    #[must_use]
    pub fn entry(&self, i: usize) -> &EntryCell {
        &self.entries[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntryCell> {
        self.entries.iter()
    }

    /// Clear every entry. Only sound while no hardware walker can reach the
    /// table.
    pub fn zero(&self) {
        for e in &self.entries {
            e.store(PageTableEntry::zero());
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.load().is_none())
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A resolved entry slot: the cell plus where it sits in the tree.
///
/// Produced by the walker and consumed by [`EntryOps`](crate::EntryOps).
#[derive(Debug, Copy, Clone)]
pub struct Slot<'a> {
    cell: &'a EntryCell,
    level: Level,
    va: VirtualAddress,
}

impl<'a> Slot<'a> {
    #[must_use]
    pub const fn new(cell: &'a EntryCell, level: Level, va: VirtualAddress) -> Self {
        Self { cell, level, va }
    }

    /// Current value of the entry.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> PageTableEntry {
        self.cell.load()
    }

    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }

    /// The address the walk was started for.
    #[must_use]
    pub const fn va(&self) -> VirtualAddress {
        self.va
    }

    #[must_use]
    pub const fn cell(&self) -> &'a EntryCell {
        self.cell
    }
}
