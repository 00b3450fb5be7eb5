//! # Page Table Integrity Check
//!
//! An optional observer of every leaf transition. [`EntryOps`] reports each
//! store and each clear to a [`PageTableCheck`]; the observer never alters
//! the outcome.
//!
//! [`RefCountCheck`] cross-checks user mappings against per-frame map counts
//! kept by the physical memory manager:
//!
//! - an anonymous frame is never mapped from a file mapping, and vice versa;
//! - an anonymous frame mapped writable is mapped exactly once;
//! - no count goes negative.
//!
//! A violation means the page tables and the memory manager disagree about
//! who owns a frame. It is reported with a panic.
//!
//! [`EntryOps`]: crate::EntryOps

use crate::{Asid, Level, PageTableEntry};
use core::sync::atomic::{AtomicI32, Ordering};
use kernel_memory_addresses::{Pfn, VirtualAddress};

/// Observer of leaf transitions.
pub trait PageTableCheck {
    /// `new` was stored over `old`.
    fn entry_set(
        &self,
        asid: Asid,
        va: VirtualAddress,
        level: Level,
        old: PageTableEntry,
        new: PageTableEntry,
    );

    /// `old` was removed, leaving the slot empty.
    fn entry_cleared(&self, asid: Asid, va: VirtualAddress, level: Level, old: PageTableEntry);
}

/// Checking disabled.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoCheck;

impl PageTableCheck for NoCheck {
    #[inline(always)]
    fn entry_set(&self, _: Asid, _: VirtualAddress, _: Level, _: PageTableEntry, _: PageTableEntry) {
    }

    #[inline(always)]
    fn entry_cleared(&self, _: Asid, _: VirtualAddress, _: Level, _: PageTableEntry) {}
}

impl<T: PageTableCheck + ?Sized> PageTableCheck for &T {
    #[inline]
    fn entry_set(
        &self,
        asid: Asid,
        va: VirtualAddress,
        level: Level,
        old: PageTableEntry,
        new: PageTableEntry,
    ) {
        (**self).entry_set(asid, va, level, old, new);
    }

    #[inline]
    fn entry_cleared(&self, asid: Asid, va: VirtualAddress, level: Level, old: PageTableEntry) {
        (**self).entry_cleared(asid, va, level, old);
    }
}

/// How the memory manager uses a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Anonymous memory (heap, stack, private copy-on-write copies).
    Anonymous,
    /// Page-cache memory backed by a file.
    File,
}

/// Per-frame mapping counters, owned by the physical memory manager.
#[derive(Debug, Default)]
pub struct FrameMapCounts {
    anon: AtomicI32,
    file: AtomicI32,
}

impl FrameMapCounts {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            anon: AtomicI32::new(0),
            file: AtomicI32::new(0),
        }
    }

    #[must_use]
    pub fn anon(&self) -> i32 {
        self.anon.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn file(&self) -> i32 {
        self.file.load(Ordering::Relaxed)
    }
}

/// Frame bookkeeping the integrity check consults.
pub trait FrameOwnership {
    fn frame_kind(&self, pfn: Pfn) -> FrameKind;

    /// Counters of `pfn`, or `None` for frames the memory manager does not
    /// track (device memory, firmware regions).
    fn map_counts(&self, pfn: Pfn) -> Option<&FrameMapCounts>;
}

impl<T: FrameOwnership + ?Sized> FrameOwnership for &T {
    #[inline]
    fn frame_kind(&self, pfn: Pfn) -> FrameKind {
        (**self).frame_kind(pfn)
    }

    #[inline]
    fn map_counts(&self, pfn: Pfn) -> Option<&FrameMapCounts> {
        (**self).map_counts(pfn)
    }
}

/// A detected ownership inconsistency.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckViolation {
    #[error("anonymous frame {pfn:?} also has file mappings")]
    AnonymousMappedAsFile { pfn: Pfn },
    #[error("file frame {pfn:?} also has anonymous mappings")]
    FileMappedAsAnonymous { pfn: Pfn },
    #[error("anonymous frame {pfn:?} mapped writable {count} times")]
    SharedWritableAnonymous { pfn: Pfn, count: i32 },
    #[error("map count of frame {pfn:?} went negative")]
    NegativeMapCount { pfn: Pfn },
}

/// Map-count based integrity check of user leaves.
#[derive(Debug)]
pub struct RefCountCheck<P> {
    owner: P,
}

impl<P: FrameOwnership> RefCountCheck<P> {
    #[must_use]
    pub const fn new(owner: P) -> Self {
        Self { owner }
    }

    #[must_use]
    pub const fn owner(&self) -> &P {
        &self.owner
    }

    /// Account one more mapping of every frame covered by `entry`.
    ///
    /// # Errors
    /// The first violation found; counters of earlier frames stay updated.
    pub fn account_set(&self, entry: PageTableEntry, level: Level) -> Result<(), CheckViolation> {
        let first = entry.leaf_frame_base(level);
        let writable = entry.write();
        for i in 0..level.pages() {
            let pfn = first + i;
            let Some(counts) = self.owner.map_counts(pfn) else {
                continue;
            };
            match self.owner.frame_kind(pfn) {
                FrameKind::Anonymous => {
                    if counts.file() != 0 {
                        return Err(CheckViolation::AnonymousMappedAsFile { pfn });
                    }
                    let count = counts.anon.fetch_add(1, Ordering::AcqRel) + 1;
                    if count > 1 && writable {
                        return Err(CheckViolation::SharedWritableAnonymous { pfn, count });
                    }
                }
                FrameKind::File => {
                    if counts.anon() != 0 {
                        return Err(CheckViolation::FileMappedAsAnonymous { pfn });
                    }
                    if counts.file.fetch_add(1, Ordering::AcqRel) + 1 < 0 {
                        return Err(CheckViolation::NegativeMapCount { pfn });
                    }
                }
            }
        }
        Ok(())
    }

    /// Account the removal of one mapping of every frame covered by `entry`.
    ///
    /// # Errors
    /// The first violation found; counters of earlier frames stay updated.
    pub fn account_clear(
        &self,
        entry: PageTableEntry,
        level: Level,
    ) -> Result<(), CheckViolation> {
        let first = entry.leaf_frame_base(level);
        for i in 0..level.pages() {
            let pfn = first + i;
            let Some(counts) = self.owner.map_counts(pfn) else {
                continue;
            };
            match self.owner.frame_kind(pfn) {
                FrameKind::Anonymous => {
                    if counts.file() != 0 {
                        return Err(CheckViolation::AnonymousMappedAsFile { pfn });
                    }
                    if counts.anon.fetch_sub(1, Ordering::AcqRel) - 1 < 0 {
                        return Err(CheckViolation::NegativeMapCount { pfn });
                    }
                }
                FrameKind::File => {
                    if counts.anon() != 0 {
                        return Err(CheckViolation::FileMappedAsAnonymous { pfn });
                    }
                    if counts.file.fetch_sub(1, Ordering::AcqRel) - 1 < 0 {
                        return Err(CheckViolation::NegativeMapCount { pfn });
                    }
                }
            }
        }
        Ok(())
    }
}

impl<P: FrameOwnership> PageTableCheck for RefCountCheck<P> {
    /// # Panics
    /// On any [`CheckViolation`].
    fn entry_set(
        &self,
        asid: Asid,
        va: VirtualAddress,
        level: Level,
        old: PageTableEntry,
        new: PageTableEntry,
    ) {
        if old.is_user_accessible(level)
            && let Err(v) = self.account_clear(old, level)
        {
            panic!("page table check: {v} ({asid:?}, {va:?}, {level:?})");
        }
        if new.is_user_accessible(level)
            && let Err(v) = self.account_set(new, level)
        {
            panic!("page table check: {v} ({asid:?}, {va:?}, {level:?})");
        }
    }

    /// # Panics
    /// On any [`CheckViolation`].
    fn entry_cleared(&self, asid: Asid, va: VirtualAddress, level: Level, old: PageTableEntry) {
        if old.is_user_accessible(level)
            && let Err(v) = self.account_clear(old, level)
        {
            panic!("page table check: {v} ({asid:?}, {va:?}, {level:?})");
        }
    }
}
