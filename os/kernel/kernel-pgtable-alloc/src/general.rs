use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_pgtable::{Level, PageTable, TableAllocator};

/// Physical page allocator backing [`GeneralTableAlloc`].
pub trait FrameSource {
    /// One 4 KiB-aligned frame, or `None` on out-of-memory.
    fn alloc_frame(&self) -> Option<PhysicalAddress>;
}

impl<T: FrameSource + ?Sized> FrameSource for &T {
    #[inline]
    fn alloc_frame(&self) -> Option<PhysicalAddress> {
        (**self).alloc_frame()
    }
}

/// Link word of a recycled table marking the end of the list.
const END: u64 = u64::MAX;

/// Intrusive list of handed-back tables.
///
/// Each recycled table is zero except for its first word, which holds the
/// physical address of the next one.
#[derive(Debug)]
struct Recycled {
    head: Option<PhysicalAddress>,
    len: usize,
}

/// Steady-state allocator: frame source plus recycle list, reached through
/// the direct map.
#[derive(Debug)]
pub struct GeneralTableAlloc<F> {
    source: F,
    direct_map: VirtualAddress,
    recycled: spin::Mutex<Recycled>,
}

impl<F: FrameSource> GeneralTableAlloc<F> {
    /// Allocator whose tables live at `direct_map + pa`.
    ///
    /// Every frame `source` hands out must be covered by the direct map.
    pub const fn new(source: F, direct_map: VirtualAddress) -> Self {
        Self {
            source,
            direct_map,
            recycled: spin::Mutex::new(Recycled { head: None, len: 0 }),
        }
    }

    #[must_use]
    pub const fn source(&self) -> &F {
        &self.source
    }

    #[must_use]
    pub const fn direct_map(&self) -> VirtualAddress {
        self.direct_map
    }

    /// Tables waiting on the recycle list.
    #[must_use]
    pub fn recycled(&self) -> usize {
        self.recycled.lock().len
    }

    #[inline]
    fn link_word(&self, pa: PhysicalAddress) -> *mut u64 {
        self.direct_map.wrapping_add(pa.as_u64()).as_u64() as *mut u64
    }

    fn pop(&self) -> Option<PhysicalAddress> {
        let mut list = self.recycled.lock();
        let pa = list.head?;
        let link = self.link_word(pa);
        // SAFETY: `pa` is a table on the list, owned by us and mapped.
        let next = unsafe { link.read_volatile() };
        // SAFETY: as above; clearing the link leaves the table all zero.
        unsafe { link.write_volatile(0) };
        list.head = (next != END).then_some(PhysicalAddress::new(next));
        list.len -= 1;
        Some(pa)
    }
}

impl<F: FrameSource> TableAllocator for GeneralTableAlloc<F> {
    fn alloc_table(&self, level: Level, _va_hint: VirtualAddress) -> Option<PhysicalAddress> {
        if let Some(pa) = self.pop() {
            log::trace!("reusing {level:?} table {pa:?}");
            return Some(pa);
        }

        let Some(pa) = self.source.alloc_frame() else {
            log::warn!("out of frames allocating a {level:?} table");
            return None;
        };
        debug_assert!(pa.is_page_aligned(), "frame source returned {pa:?}");

        // SAFETY: fresh frame from the source, covered by the direct map.
        unsafe { self.table(level, pa) }.zero();
        Some(pa)
    }

    fn free_table(&self, level: Level, pa: PhysicalAddress) {
        // SAFETY: the caller hands back a table it no longer references.
        unsafe { self.table(level, pa) }.zero();

        let mut list = self.recycled.lock();
        let next = list.head.map_or(END, PhysicalAddress::as_u64);
        // SAFETY: the table is ours again and mapped.
        unsafe { self.link_word(pa).write_volatile(next) };
        list.head = Some(pa);
        list.len += 1;
        log::trace!("recycled {level:?} table {pa:?} ({} waiting)", list.len);
    }

    unsafe fn table<'a>(&self, _level: Level, pa: PhysicalAddress) -> &'a PageTable {
        let va = self.direct_map.wrapping_add(pa.as_u64());
        // SAFETY: direct mapped; the caller guarantees `pa` is a live table.
        unsafe { &*(va.as_u64() as *const PageTable) }
    }
}
