//! # Address Space (RISC-V, `satp`-rooted)
//!
//! One page-table tree plus everything needed to mutate it safely from
//! several harts at once.
//!
//! ## Highlights
//!
//! - [`AddressSpace::lookup`] finds the slot for a VA without allocating.
//! - [`AddressSpace::ensure`] allocates and links missing tables down to a
//!   target level.
//! - [`AddressSpace::map`] / [`AddressSpace::unmap`] /
//!   [`AddressSpace::change_protection`] for single leaves.
//! - [`AddressSpace::map_range`] / [`AddressSpace::unmap_range`] for runs of
//!   leaves under the address-space range lock.
//! - [`AddressSpace::translate`] resolves a VA to a PA, huge leaves included.
//! - [`AddressSpace::activate`] loads `satp` with this space.
//!
//! ## Walk
//!
//! Starting at the root, each level reads one entry:
//!
//! - leaf (or any non-empty, non-table word): stop and return that slot;
//!   a huge mapping is never descended into;
//! - table pointer: descend to the next level;
//! - empty: stop, or (when ensuring) allocate a zeroed table and link it with
//!   a single compare-and-swap.
//!
//! If two harts race to link the same slot, exactly one table wins. The
//! loser gives its table back through [`TableAllocator::free_table`] and
//! continues the walk through the winner's entry.

use crate::codec::{encode_table, modify, try_encode};
use crate::transition::must_clear_first;
use crate::{
    AddressSpaceConfig, Asid, EntryCell, EntryOps, Level, LocalHart, NoCheck, PageProt, PageTable,
    PageTableCheck, PageTableEntry, Satp, Slot, TableAllocator, TlbSync, TransitionError,
    WalkError,
};
use kernel_memory_addresses::{PhysicalAddress, Pfn, VirtualAddress};

/// Handle to a single page-table tree.
pub struct AddressSpace<'c, A, S = LocalHart, C = NoCheck>
where
    A: TableAllocator,
    S: TlbSync,
    C: PageTableCheck,
{
    config: &'c AddressSpaceConfig,
    root: PhysicalAddress,
    alloc: A,
    sync: S,
    check: C,
    asid: Asid,
    range_lock: spin::Mutex<()>,
}

impl<'c, A, S, C> AddressSpace<'c, A, S, C>
where
    A: TableAllocator,
    S: TlbSync,
    C: PageTableCheck,
{
    /// Create an empty address space with a freshly allocated root.
    ///
    /// # Errors
    /// [`WalkError::OutOfMemory`] if the allocator has no table for the root.
    pub fn new(
        config: &'c AddressSpaceConfig,
        alloc: A,
        sync: S,
        check: C,
        asid: Asid,
    ) -> Result<Self, WalkError> {
        let level = config.root_level();
        let root = alloc
            .alloc_table(level, VirtualAddress::zero())
            .ok_or(WalkError::OutOfMemory { level })?;
        log::debug!("{asid:?}: root {level:?} table at {root:?}");
        Ok(Self::from_root(config, root, alloc, sync, check, asid))
    }

    /// Adopt an existing tree rooted at `root`.
    ///
    /// `root` and every table reachable from it must be addressable through
    /// `alloc`.
    pub const fn from_root(
        config: &'c AddressSpaceConfig,
        root: PhysicalAddress,
        alloc: A,
        sync: S,
        check: C,
        asid: Asid,
    ) -> Self {
        Self {
            config,
            root,
            alloc,
            sync,
            check,
            asid,
            range_lock: spin::Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &'c AddressSpaceConfig {
        self.config
    }

    /// Physical address of the root table.
    #[must_use]
    pub const fn root(&self) -> PhysicalAddress {
        self.root
    }

    #[must_use]
    pub const fn asid(&self) -> Asid {
        self.asid
    }

    #[must_use]
    pub const fn allocator(&self) -> &A {
        &self.alloc
    }

    #[must_use]
    pub const fn check(&self) -> &C {
        &self.check
    }

    /// Transition protocol bound to this space's hooks.
    #[must_use]
    pub const fn entry_ops(&self) -> EntryOps<'_, S, C> {
        EntryOps::new(&self.sync, &self.check, self.asid)
    }

    /// `satp` value that activates this space.
    #[must_use]
    pub fn satp(&self) -> Satp {
        Satp::for_root(self.config.mode(), self.asid, self.root)
    }

    /// Load `satp` with this space.
    ///
    /// # Safety
    /// The space must map the executing code, its stack and everything it
    /// touches until the next switch.
    #[cfg(all(feature = "asm", target_arch = "riscv64"))]
    pub unsafe fn activate(&self) {
        unsafe { self.satp().store_unsafe() }
    }

    #[inline]
    fn table(&self, level: Level, pa: PhysicalAddress) -> &PageTable {
        // SAFETY: `pa` is the root or a table linked by `link_table`, both
        // handed out by this allocator and owned by this tree.
        unsafe { self.alloc.table(level, pa) }
    }

    /// Find the slot for `va` without allocating.
    ///
    /// Stops at a leaf at any level, at an empty or otherwise non-table
    /// entry, or at L1.
    ///
    /// # Errors
    /// [`WalkError::NonCanonical`] for addresses outside the paging mode.
    pub fn lookup(&self, va: VirtualAddress) -> Result<Slot<'_>, WalkError> {
        self.walk(va, Level::L1, false)
    }

    /// Find the slot for `va` at `target`, allocating and linking missing
    /// tables on the way.
    ///
    /// A leaf above `target` ends the walk early; the returned slot then
    /// sits at a higher level than requested.
    ///
    /// # Errors
    /// - [`WalkError::NonCanonical`] for addresses outside the paging mode.
    /// - [`WalkError::LevelOutOfRange`] if `target` is above the root.
    /// - [`WalkError::OutOfMemory`] if a table could not be allocated.
    pub fn ensure(&self, va: VirtualAddress, target: Level) -> Result<Slot<'_>, WalkError> {
        if target > self.config.root_level() {
            return Err(WalkError::LevelOutOfRange { level: target });
        }
        self.walk(va, target, true)
    }

    fn walk(
        &self,
        va: VirtualAddress,
        target: Level,
        allocate: bool,
    ) -> Result<Slot<'_>, WalkError> {
        if !self.config.is_canonical(va) {
            return Err(WalkError::NonCanonical { va });
        }

        let mut level = self.config.root_level();
        let mut table = self.table(level, self.root);
        loop {
            let cell = table.entry(level.index(va));
            let slot = Slot::new(cell, level, va);
            let Some(next) = level.next_lower() else {
                return Ok(slot);
            };
            if level == target {
                return Ok(slot);
            }

            let mut entry = cell.load();
            if entry.is_none() {
                if !allocate {
                    return Ok(slot);
                }
                entry = self.link_table(cell, next, va)?;
            }
            if !entry.is_table() {
                return Ok(slot);
            }

            table = self.table(next, entry.pfn().base());
            level = next;
        }
    }

    /// Allocate a `level` table and link it into the empty `cell`.
    ///
    /// Returns the entry now in the cell: the new link, or whatever another
    /// hart put there first.
    fn link_table(
        &self,
        cell: &EntryCell,
        level: Level,
        va: VirtualAddress,
    ) -> Result<PageTableEntry, WalkError> {
        let pa = self
            .alloc
            .alloc_table(level, va)
            .ok_or(WalkError::OutOfMemory { level })?;
        let link = encode_table(self.config, pa.pfn());

        match cell.compare_exchange(PageTableEntry::zero(), link) {
            Ok(_) => {
                log::debug!("{:?}: linked {level:?} table {pa:?} for {va:?}", self.asid);
                Ok(link)
            }
            Err(winner) => {
                log::debug!(
                    "{:?}: lost race linking {level:?} for {va:?}, returning {pa:?}",
                    self.asid
                );
                self.alloc.free_table(level, pa);
                Ok(winner)
            }
        }
    }

    /// Translate `va` the way the MMU would.
    ///
    /// `None` if the address is non-canonical or not mapped by a valid leaf.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let slot = self.lookup(va).ok()?;
        let entry = slot.entry();
        if !entry.is_huge() {
            return None;
        }
        let level = slot.level();
        Some(entry.leaf_frame_base(level).base() + va.offset_in(level.page_size()))
    }

    /// Map one leaf of `level` size at `va` to `frame`.
    ///
    /// Returns the entry that was replaced (empty or a swap entry).
    ///
    /// # Errors
    /// - [`WalkError::Contract`] for a frame out of range or misaligned.
    /// - [`WalkError::LeafOccupied`] if a leaf above `level` covers `va`.
    /// - [`WalkError::Transition`] if the slot maps another frame.
    /// - Anything [`ensure`](Self::ensure) reports.
    pub fn map(
        &self,
        va: VirtualAddress,
        frame: Pfn,
        prot: PageProt,
        level: Level,
    ) -> Result<PageTableEntry, WalkError> {
        let (slot, entry) = self.leaf_slot(va, frame, prot, level)?;
        Ok(self.entry_ops().install(&slot, entry)?)
    }

    /// Encode the leaf for `frame` and reach its slot, linking tables as
    /// needed. Nothing is installed.
    fn leaf_slot(
        &self,
        va: VirtualAddress,
        frame: Pfn,
        prot: PageProt,
        level: Level,
    ) -> Result<(Slot<'_>, PageTableEntry), WalkError> {
        debug_assert_eq!(va.offset_in(level.page_size()), 0, "virtual address not aligned");

        let entry = try_encode(self.config, frame, prot, level)?;
        let slot = self.ensure(va, level)?;
        if slot.level() != level {
            return Err(WalkError::LeafOccupied {
                level: slot.level(),
                entry: slot.entry(),
            });
        }
        Ok((slot, entry))
    }

    /// Remove whatever leaf (or swap entry) covers `va`.
    ///
    /// Returns the removed entry, `None` if nothing was there.
    #[must_use]
    pub fn unmap(&self, va: VirtualAddress) -> Option<PageTableEntry> {
        let slot = self.lookup(va).ok()?;
        if slot.entry().is_none() {
            return None;
        }
        Some(self.entry_ops().clear_and_capture(&slot))
    }

    /// Replace the protection of the mapping covering `va`, keeping frame,
    /// accessed, dirty and software bits.
    ///
    /// Returns the entry before the change.
    ///
    /// # Errors
    /// [`WalkError::NotMapped`] if no present mapping covers `va`.
    pub fn change_protection(
        &self,
        va: VirtualAddress,
        prot: PageProt,
    ) -> Result<PageTableEntry, WalkError> {
        let slot = self.lookup(va)?;
        let entry = slot.entry();
        if !entry.is_present() || entry.is_table() {
            return Err(WalkError::NotMapped { va });
        }
        let config = self.config;
        Ok(self
            .entry_ops()
            .update(&slot, |old| modify(config, old, prot)))
    }

    /// Map `len` bytes at `va` to consecutive frames from `frame`, with
    /// leaves of `level` size.
    ///
    /// Holds the range lock for the whole run. Every leaf is checked before
    /// the first one is installed, so a bad frame, a covering huge leaf or a
    /// slot holding another frame fails the call with the range untouched
    /// (tables linked on the way stay linked). Entries already in the range
    /// (swap entries, the same frame) are replaced as [`map`](Self::map)
    /// replaces them.
    ///
    /// Single-entry writers that bypass the range lock and change a slot of
    /// the run between the check and the install make the install fail; the
    /// leaves installed before it then stay.
    ///
    /// # Errors
    /// As [`map`](Self::map), for the first leaf that failed.
    pub fn map_range(
        &self,
        va: VirtualAddress,
        frame: Pfn,
        len: u64,
        prot: PageProt,
        level: Level,
    ) -> Result<(), WalkError> {
        let size = level.page_size();
        debug_assert_eq!(len % size, 0, "length not a multiple of the leaf size");
        let count = len / size;

        let leaf = |i: u64| (va.wrapping_add(i * size), frame + i * level.pages());

        let _guard = self.range_lock.lock();
        for i in 0..count {
            let (at, pfn) = leaf(i);
            let (slot, new) = self.leaf_slot(at, pfn, prot, level)?;
            let old = slot.entry();
            if must_clear_first(old, new) {
                return Err(TransitionError::SlotOccupied { old, new }.into());
            }
        }

        let ops = self.entry_ops();
        for i in 0..count {
            let (at, pfn) = leaf(i);
            let installed = self
                .leaf_slot(at, pfn, prot, level)
                .and_then(|(slot, new)| ops.install(&slot, new).map_err(WalkError::from));
            if let Err(e) = installed {
                log::warn!(
                    "{:?}: {at:?} changed under map_range, {i} of {count} leaves stay mapped",
                    self.asid
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Remove every leaf and swap entry in `[va, va + len)`.
    ///
    /// A huge leaf that overlaps the range is removed whole. Empty subtrees
    /// are skipped at the level they are found. Tables are left linked.
    ///
    /// Returns the number of entries removed.
    pub fn unmap_range(&self, va: VirtualAddress, len: u64) -> usize {
        let _guard = self.range_lock.lock();
        let ops = self.entry_ops();

        let mut removed = 0;
        let mut at = va;
        let mut remaining = len;
        while remaining > 0 {
            let Ok(slot) = self.lookup(at) else {
                break;
            };
            if !slot.entry().is_none() {
                ops.clear_and_capture(&slot);
                removed += 1;
            }
            let span = slot.level().page_size();
            let step = (span - at.offset_in(span)).min(remaining);
            at = at.wrapping_add(step);
            remaining -= step;
        }
        removed
    }
}

impl<A, S, C> core::fmt::Debug for AddressSpace<'_, A, S, C>
where
    A: TableAllocator,
    S: TlbSync,
    C: PageTableCheck,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("mode", &self.config.mode())
            .field("root", &self.root)
            .field("asid", &self.asid)
            .finish_non_exhaustive()
    }
}
