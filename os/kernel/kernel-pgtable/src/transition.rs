//! # Entry Transitions
//!
//! Every change of a leaf entry is one atomic read-modify-write of its word,
//! paired with the maintenance it owes:
//!
//! | Operation | Word update | Integrity hook | `fence.i` | `sfence.vma` |
//! |---|---|---|---|---|
//! | [`install`](EntryOps::install) | CAS loop | set | new is `V+X` | old was valid, or new is `V+X` |
//! | [`clear_and_capture`](EntryOps::clear_and_capture) | swap with 0 | cleared | - | old was valid |
//! | [`test_and_clear_accessed`](EntryOps::test_and_clear_accessed) | and `!A` | - | - | never |
//! | [`clear_write`](EntryOps::clear_write) | and `!W` | - | - | always |
//! | [`update_if_different`](EntryOps::update_if_different) | swap if changed | set | new is `V+X` | always |
//! | [`establish`](EntryOps::establish) | swap | set | - | always |
//! | [`update`](EntryOps::update) | CAS loop | set | new is `V+X` | always |
//! | [`update_mmu_cache`](EntryOps::update_mmu_cache) | - | - | - | always |
//!
//! Atomicity is per word. Sequences over several entries need the caller's
//! own exclusion (see [`AddressSpace::map_range`](crate::AddressSpace::map_range)).

use crate::{Asid, PageTableCheck, PageTableEntry, PageProt, Presence, Slot, TlbSync, TransitionError};
use kernel_memory_addresses::VirtualAddress;

/// `old` has to go through [`EntryOps::clear_and_capture`] before `new` may
/// replace it: it links a table or still owns another frame, translated or
/// not.
#[inline]
pub(crate) fn must_clear_first(old: PageTableEntry, new: PageTableEntry) -> bool {
    old.is_table() || (Presence::of(old).maps_frame() && old.pfn() != new.pfn())
}

/// Transition protocol bound to one address space's maintenance and
/// integrity hooks.
#[derive(Debug)]
pub struct EntryOps<'a, S: TlbSync, C: PageTableCheck> {
    sync: &'a S,
    check: &'a C,
    asid: Asid,
}

impl<'a, S: TlbSync, C: PageTableCheck> EntryOps<'a, S, C> {
    #[must_use]
    pub const fn new(sync: &'a S, check: &'a C, asid: Asid) -> Self {
        Self { sync, check, asid }
    }

    #[must_use]
    pub const fn asid(&self) -> Asid {
        self.asid
    }

    #[inline]
    fn flush_icache_if_exec(&self, new: PageTableEntry) {
        if new.present() && new.exec() {
            self.sync.flush_icache(new);
        }
    }

    /// Store `new` into an empty, swapped-out or same-frame slot.
    ///
    /// Returns the entry that was replaced.
    ///
    /// # Errors
    /// [`TransitionError::SlotOccupied`] if the slot links a table or holds
    /// a different frame (including a `PROT_NONE` or invalidated leaf); such
    /// a slot must go through
    /// [`clear_and_capture`](Self::clear_and_capture) first.
    pub fn install(
        &self,
        slot: &Slot<'_>,
        new: PageTableEntry,
    ) -> Result<PageTableEntry, TransitionError> {
        self.flush_icache_if_exec(new);

        let cell = slot.cell();
        let mut old = cell.load();
        loop {
            if must_clear_first(old, new) {
                return Err(TransitionError::SlotOccupied { old, new });
            }
            match cell.compare_exchange(old, new) {
                Ok(_) => break,
                Err(current) => old = current,
            }
        }

        log::trace!(
            "{:?} {:?} {:?}: install {:#018x} over {:#018x}",
            self.asid,
            slot.va(),
            slot.level(),
            new.into_bits(),
            old.into_bits()
        );

        self.check
            .entry_set(self.asid, slot.va(), slot.level(), old, new);

        if old.present() || (new.present() && new.exec()) {
            self.sync.flush_tlb_page(slot.va());
        }
        Ok(old)
    }

    /// Empty the slot and return what it held.
    pub fn clear_and_capture(&self, slot: &Slot<'_>) -> PageTableEntry {
        let old = slot.cell().swap(PageTableEntry::zero());
        log::trace!(
            "{:?} {:?} {:?}: cleared {:#018x}",
            self.asid,
            slot.va(),
            slot.level(),
            old.into_bits()
        );

        if !old.is_none() {
            self.check
                .entry_cleared(self.asid, slot.va(), slot.level(), old);
        }
        if old.present() {
            self.sync.flush_tlb_page(slot.va());
        }
        old
    }

    /// Clear `A` and report whether it was set.
    ///
    /// No fence: a stale cached translation only skews page aging.
    pub fn test_and_clear_accessed(&self, slot: &Slot<'_>) -> bool {
        if !slot.entry().accessed() {
            return false;
        }
        slot.cell()
            .fetch_clear(PageProt::ACCESSED.bits())
            .accessed()
    }

    /// Revoke write permission. The revocation is visible to this hart's
    /// translations on return.
    ///
    /// Returns the entry before the clear.
    pub fn clear_write(&self, slot: &Slot<'_>) -> PageTableEntry {
        let old = slot.cell().fetch_clear(PageProt::WRITE.bits());
        self.sync.flush_tlb_page(slot.va());
        old
    }

    /// Store `new` unless the slot already holds it; fence either way.
    ///
    /// Meant for access-flag updates of the same frame after a fault. The
    /// fence is unconditional because the hardware walker may have cached the
    /// entry that faulted.
    ///
    /// Returns whether the word changed.
    pub fn update_if_different(&self, slot: &Slot<'_>, new: PageTableEntry) -> bool {
        let changed = slot.entry() != new;
        if changed {
            self.flush_icache_if_exec(new);
            let old = slot.cell().swap(new);
            self.check
                .entry_set(self.asid, slot.va(), slot.level(), old, new);
        }
        self.sync.flush_tlb_page(slot.va());
        changed
    }

    /// Replace a huge entry wholesale and return the previous one.
    pub fn establish(&self, slot: &Slot<'_>, new: PageTableEntry) -> PageTableEntry {
        let old = slot.cell().swap(new);
        log::trace!(
            "{:?} {:?} {:?}: establish {:#018x} over {:#018x}",
            self.asid,
            slot.va(),
            slot.level(),
            new.into_bits(),
            old.into_bits()
        );
        self.check
            .entry_set(self.asid, slot.va(), slot.level(), old, new);
        self.sync.flush_tlb_page(slot.va());
        old
    }

    /// Atomically rewrite the entry with `f` (retried until no other hart
    /// interfered) and fence.
    ///
    /// Returns the entry `f` was finally applied to.
    pub fn update(
        &self,
        slot: &Slot<'_>,
        f: impl Fn(PageTableEntry) -> PageTableEntry,
    ) -> PageTableEntry {
        let cell = slot.cell();
        let mut old = cell.load();
        let new = loop {
            let new = f(old);
            match cell.compare_exchange(old, new) {
                Ok(_) => break new,
                Err(current) => old = current,
            }
        };
        if new != old {
            self.flush_icache_if_exec(new);
            self.check
                .entry_set(self.asid, slot.va(), slot.level(), old, new);
        }
        self.sync.flush_tlb_page(slot.va());
        old
    }

    /// Commit a resolved fault to the MMU.
    pub fn update_mmu_cache(&self, va: VirtualAddress) {
        self.sync.flush_tlb_page(va);
    }
}
