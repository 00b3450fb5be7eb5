//! # RISC-V Page Table Entry
//!
//! One 64-bit word, identical at every level of Sv39/Sv48/Sv57:
//!
//! ```text
//! 63      59 58  54 53                    10 9   8  7 6 5 4 3 2 1 0
//! | MT bits | rsvd |          PPN          | RSW  | D A G U X W R V |
//! ```
//!
//! - `V=1, R=W=X=0`: pointer to the next-level table.
//! - `V=1`, any of `R/W/X`: leaf. Above L1 this is a huge mapping.
//! - `V=0, G=1`: `PROT_NONE` (NUMA hinting); the entry still owns its frame.
//! - `V=0`, leaf bits set: invalidated leaf (huge entry being split).
//! - `V=0`, everything above clear, word non-zero: swap entry.
//!
//! The helpers here are pure: they return a new word and never touch memory.
//! Stores go through [`EntryCell`](crate::EntryCell).

use crate::{Level, PageProt};
use bitfield_struct::bitfield;
use kernel_memory_addresses::Pfn;

/// Width of the `PPN` field.
pub const PFN_BITS: u32 = 44;

/// Bit position of the `PPN` field.
pub const PFN_SHIFT: u32 = 10;

/// Largest frame number the `PPN` field can carry.
pub const MAX_PFN: u64 = (1 << PFN_BITS) - 1;

/// The `PPN` field in place.
pub const PFN_MASK: u64 = MAX_PFN << PFN_SHIFT;

/// A RISC-V page-table entry (bit-exact hardware layout).
#[bitfield(u64)]
#[derive(PartialEq, Eq, Hash)]
pub struct PageTableEntry {
    /// V (bit 0).
    pub present: bool,
    /// R (bit 1).
    pub read: bool,
    /// W (bit 2).
    pub write: bool,
    /// X (bit 3).
    pub exec: bool,
    /// U (bit 4): accessible from U-mode.
    pub user: bool,
    /// G (bit 5): global mapping. Doubles as the `PROT_NONE` marker while V
    /// is clear.
    pub global: bool,
    /// A (bit 6).
    pub accessed: bool,
    /// D (bit 7).
    pub dirty: bool,
    /// RSW bit 8: special mapping without a backing page descriptor.
    pub special: bool,
    /// RSW bit 9.
    pub soft: bool,
    /// Physical frame number (bits 10..53).
    #[bits(44)]
    pub ppn: u64,
    #[bits(5)]
    __reserved: u8,
    /// Memory-type attributes (bits 59..63), interpreted by the
    /// [`MemoryModel`](crate::MemoryModel).
    #[bits(5)]
    pub mem_type: u8,
}

impl PageTableEntry {
    /// The empty word.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::from_bits(0)
    }

    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.into_bits() == 0
    }

    /// Present for the memory manager: valid, or `PROT_NONE`.
    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.into_bits() & (PageProt::PRESENT.bits() | PageProt::PROT_NONE.bits()) != 0
    }

    /// Any of `R/W/X` set.
    #[inline]
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        self.into_bits() & PageProt::LEAF.bits() != 0
    }

    /// Valid leaf. Above L1 this maps a huge page.
    #[inline]
    #[must_use]
    pub const fn is_huge(self) -> bool {
        self.present() && self.is_leaf()
    }

    #[inline]
    #[must_use]
    pub const fn is_protnone(self) -> bool {
        self.into_bits() & (PageProt::PRESENT.bits() | PageProt::PROT_NONE.bits())
            == PageProt::PROT_NONE.bits()
    }

    /// Valid pointer to a next-level table.
    #[inline]
    #[must_use]
    pub const fn is_table(self) -> bool {
        self.present() && !self.is_leaf()
    }

    /// A non-empty intermediate entry that cannot be descended into.
    #[inline]
    #[must_use]
    pub const fn is_bad(self) -> bool {
        !self.is_none() && !self.is_table()
    }

    /// Present, user-accessible mapping of a frame at `level`.
    ///
    /// Above L1 only leaves qualify; a table pointer is never "user
    /// accessible" even though hardware ignores its `U` bit.
    #[inline]
    #[must_use]
    pub fn is_user_accessible(self, level: Level) -> bool {
        self.is_present() && self.user() && (level == Level::L1 || self.is_leaf())
    }

    #[inline]
    #[must_use]
    pub const fn pfn(self) -> Pfn {
        Pfn::new(self.ppn())
    }

    #[inline]
    #[must_use]
    pub const fn with_pfn(self, pfn: Pfn) -> Self {
        self.with_ppn(pfn.as_u64() & MAX_PFN)
    }

    /// Everything but the frame number.
    #[inline]
    #[must_use]
    pub const fn prot(self) -> PageProt {
        PageProt::from_bits_retain(self.into_bits() & !PFN_MASK)
    }

    /// First frame of a leaf at `level`, aligned down to the size it maps.
    #[inline]
    #[must_use]
    pub const fn leaf_frame_base(self, level: Level) -> Pfn {
        self.pfn().align_down(level.pages())
    }

    #[inline]
    #[must_use]
    pub const fn wrprotect(self) -> Self {
        self.with_write(false)
    }

    #[inline]
    #[must_use]
    pub const fn mkwrite(self) -> Self {
        self.with_write(true)
    }

    #[inline]
    #[must_use]
    pub const fn mkdirty(self) -> Self {
        self.with_dirty(true)
    }

    #[inline]
    #[must_use]
    pub const fn mkclean(self) -> Self {
        self.with_dirty(false)
    }

    #[inline]
    #[must_use]
    pub const fn mkyoung(self) -> Self {
        self.with_accessed(true)
    }

    #[inline]
    #[must_use]
    pub const fn mkold(self) -> Self {
        self.with_accessed(false)
    }

    #[inline]
    #[must_use]
    pub const fn mkspecial(self) -> Self {
        self.with_special(true)
    }

    /// Clear `V` and `PROT_NONE` but keep the leaf bits, so the entry stays
    /// recognizable as a mapping while hardware stops using it.
    #[inline]
    #[must_use]
    pub const fn mkinvalid(self) -> Self {
        Self::from_bits(
            self.into_bits() & !(PageProt::PRESENT.bits() | PageProt::PROT_NONE.bits()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_positions_match_hardware() {
        let e = PageTableEntry::new()
            .with_present(true)
            .with_read(true)
            .with_write(true)
            .with_exec(true)
            .with_user(true)
            .with_global(true)
            .with_accessed(true)
            .with_dirty(true);
        assert_eq!(e.into_bits(), 0xFF);

        let e = PageTableEntry::zero().with_pfn(Pfn::new(0x1));
        assert_eq!(e.into_bits(), 1 << 10);

        let e = PageTableEntry::zero().with_pfn(Pfn::new(MAX_PFN));
        assert_eq!(e.into_bits(), PFN_MASK);
        assert_eq!(PFN_MASK, 0x003F_FFFF_FFFF_FC00);

        let e = PageTableEntry::zero().with_mem_type(0b1_1111);
        assert_eq!(e.into_bits(), 0xF800_0000_0000_0000);
    }

    #[test]
    fn predicates() {
        let table = PageTableEntry::zero().with_present(true).with_pfn(Pfn::new(5));
        assert!(table.is_table());
        assert!(!table.is_leaf());
        assert!(!table.is_bad());

        let leaf = table.with_read(true);
        assert!(leaf.is_huge());
        assert!(leaf.is_bad());
        assert!(!leaf.is_protnone());

        let protnone = PageTableEntry::zero().with_global(true).with_read(true);
        assert!(protnone.is_present());
        assert!(protnone.is_protnone());
        assert!(!protnone.present());

        assert!(PageTableEntry::zero().is_none());
        assert!(!PageTableEntry::zero().is_present());
    }

    #[test]
    fn mkinvalid_keeps_leaf_bits() {
        let leaf = PageTableEntry::zero()
            .with_present(true)
            .with_read(true)
            .with_write(true)
            .with_pfn(Pfn::new(0x200));
        let inv = leaf.mkinvalid();
        assert!(!inv.is_present());
        assert!(inv.is_leaf());
        assert_eq!(inv.pfn(), leaf.pfn());
    }

    #[test]
    fn user_accessible_depends_on_level() {
        let user_leaf = PageTableEntry::zero()
            .with_present(true)
            .with_user(true)
            .with_read(true);
        assert!(user_leaf.is_user_accessible(Level::L1));
        assert!(user_leaf.is_user_accessible(Level::L2));

        let user_table = PageTableEntry::zero().with_present(true).with_user(true);
        assert!(user_table.is_user_accessible(Level::L1));
        assert!(!user_table.is_user_accessible(Level::L2));
    }

    #[test]
    fn transformers_touch_only_their_bit() {
        let e = PageTableEntry::zero()
            .with_present(true)
            .with_read(true)
            .with_pfn(Pfn::new(0x1234));
        assert_eq!(e.mkwrite().wrprotect(), e);
        assert_eq!(e.mkdirty().mkclean(), e);
        assert_eq!(e.mkyoung().mkold(), e);
        assert!(e.mkspecial().special());
        assert_eq!(e.mkyoung().into_bits() ^ e.into_bits(), 1 << 6);
    }

    #[test]
    fn huge_leaf_frame_is_aligned_down() {
        let e = PageTableEntry::zero()
            .with_present(true)
            .with_read(true)
            .with_pfn(Pfn::new(0x1234));
        assert_eq!(e.leaf_frame_base(Level::L1), Pfn::new(0x1234));
        assert_eq!(e.leaf_frame_base(Level::L2), Pfn::new(0x1200));
        assert_eq!(e.leaf_frame_base(Level::L3), Pfn::new(0));
    }
}
