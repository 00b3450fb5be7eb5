use core::sync::atomic::{AtomicU64, Ordering};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress, is_aligned};
use kernel_pgtable::{Level, PageTable, TableAllocator};

/// Rejected bootstrap window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("table window {start:?}+{len:#x} is not 4K-aligned")]
    Misaligned { start: PhysicalAddress, len: u64 },
    #[error("table window at {start:?} wraps the physical address space")]
    Overflow { start: PhysicalAddress },
}

/// Bump allocator over a boot-time window, identity mapped.
///
/// Safe to share between harts: the cursor only moves by compare-and-swap.
#[derive(Debug)]
pub struct BootstrapTableAlloc {
    start: u64,
    end: u64,
    cursor: AtomicU64,
}

impl BootstrapTableAlloc {
    /// Hand out tables from `[start, start + len)`.
    ///
    /// The window must be identity mapped (or the MMU off) for as long as the
    /// allocator and every table it handed out are in use.
    ///
    /// # Errors
    /// [`WindowError`] if the window is not page aligned or wraps.
    pub fn new(start: PhysicalAddress, len: u64) -> Result<Self, WindowError> {
        if !start.is_page_aligned() || !is_aligned(len, PAGE_SIZE) {
            return Err(WindowError::Misaligned { start, len });
        }
        let end = start
            .as_u64()
            .checked_add(len)
            .ok_or(WindowError::Overflow { start })?;

        log::debug!("bootstrap page tables: {start:?}..{:?}", PhysicalAddress::new(end));
        Ok(Self {
            start: start.as_u64(),
            end,
            cursor: AtomicU64::new(start.as_u64()),
        })
    }

    /// Tables currently handed out.
    #[must_use]
    pub fn used(&self) -> u64 {
        (self.cursor.load(Ordering::Acquire) - self.start) / PAGE_SIZE
    }

    /// Tables still available.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        (self.end - self.cursor.load(Ordering::Acquire)) / PAGE_SIZE
    }
}

impl TableAllocator for BootstrapTableAlloc {
    fn alloc_table(&self, level: Level, _va_hint: VirtualAddress) -> Option<PhysicalAddress> {
        let Ok(at) = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur + PAGE_SIZE <= self.end).then_some(cur + PAGE_SIZE)
            })
        else {
            log::warn!("bootstrap page-table window exhausted allocating {level:?}");
            return None;
        };

        let pa = PhysicalAddress::new(at);
        // SAFETY: `pa` was just carved from the identity-mapped window and
        // nobody else has seen it.
        unsafe { self.table(level, pa) }.zero();
        Some(pa)
    }

    fn free_table(&self, level: Level, pa: PhysicalAddress) {
        let top = pa.as_u64() + PAGE_SIZE;
        if self
            .cursor
            .compare_exchange(top, pa.as_u64(), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("bootstrap {level:?} table {pa:?} not on top, leaking it");
        }
    }

    unsafe fn table<'a>(&self, _level: Level, pa: PhysicalAddress) -> &'a PageTable {
        debug_assert!(
            (self.start..self.end).contains(&pa.as_u64()),
            "{pa:?} outside the bootstrap window"
        );
        // SAFETY: identity mapped; the caller guarantees `pa` is a live table.
        unsafe { &*(pa.as_u64() as *const PageTable) }
    }
}
