#![allow(dead_code)]

use kernel_pgtable::{Level, PageTable, PageTableEntry, PhysicalAddress, TableAllocator, TlbSync, VirtualAddress};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Where the simulated DRAM starts, as on QEMU `virt`.
pub const RAM_BASE: u64 = 0x8000_0000;

/// A tiny in-memory "physical RAM" of page tables.
///
/// Physical addresses are `RAM_BASE + index * 4096`. Tables are bump
/// allocated, freed tables are recycled first. Counters make allocation and
/// race behavior observable.
pub struct TestPhys {
    frames: Vec<PageTable>,
    next: AtomicUsize,
    free: Mutex<Vec<PhysicalAddress>>,
    allocated: AtomicUsize,
    freed: AtomicUsize,
}

impl TestPhys {
    pub fn with_frames(n: usize) -> Self {
        let mut frames = Vec::with_capacity(n);
        for _ in 0..n {
            frames.push(PageTable::new());
        }
        Self {
            frames,
            next: AtomicUsize::new(0),
            free: Mutex::new(Vec::new()),
            allocated: AtomicUsize::new(0),
            freed: AtomicUsize::new(0),
        }
    }

    /// Tables handed out over the lifetime of the arena.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Tables handed back through `free_table`.
    pub fn freed(&self) -> usize {
        self.freed.load(Ordering::SeqCst)
    }

    /// Tables currently in use.
    pub fn live(&self) -> usize {
        self.allocated() - self.freed()
    }

    fn index(pa: PhysicalAddress) -> usize {
        assert!(pa.is_page_aligned(), "table address {pa:?} not aligned");
        ((pa.as_u64() - RAM_BASE) >> 12) as usize
    }
}

impl TableAllocator for TestPhys {
    fn alloc_table(&self, _level: Level, _va_hint: VirtualAddress) -> Option<PhysicalAddress> {
        let pa = match self.free.lock().unwrap().pop() {
            Some(pa) => pa,
            None => {
                let idx = self.next.fetch_add(1, Ordering::SeqCst);
                if idx >= self.frames.len() {
                    return None;
                }
                PhysicalAddress::new(RAM_BASE + ((idx as u64) << 12))
            }
        };
        self.frames[Self::index(pa)].zero();
        self.allocated.fetch_add(1, Ordering::SeqCst);
        Some(pa)
    }

    fn free_table(&self, _level: Level, pa: PhysicalAddress) {
        self.freed.fetch_add(1, Ordering::SeqCst);
        self.free.lock().unwrap().push(pa);
    }

    unsafe fn table<'a>(&self, _level: Level, pa: PhysicalAddress) -> &'a PageTable {
        let table: *const PageTable = &self.frames[Self::index(pa)];
        // SAFETY: the arena outlives every address space built on it in the tests.
        unsafe { &*table }
    }
}

/// `TlbSync` that records what it was asked to do.
#[derive(Default)]
pub struct Recorder {
    pub tlb: Mutex<Vec<VirtualAddress>>,
    pub icache: AtomicUsize,
}

impl Recorder {
    pub fn tlb_flushes(&self) -> usize {
        self.tlb.lock().unwrap().len()
    }

    pub fn icache_flushes(&self) -> usize {
        self.icache.load(Ordering::SeqCst)
    }
}

impl TlbSync for Recorder {
    fn flush_tlb_page(&self, va: VirtualAddress) {
        self.tlb.lock().unwrap().push(va);
    }

    fn flush_icache(&self, _entry: PageTableEntry) {
        self.icache.fetch_add(1, Ordering::SeqCst);
    }
}
