use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, Pfn, VirtualAddress};
use kernel_pgtable::{
    AddressSpace, AddressSpaceConfig, Asid, EntryOps, Level, LocalHart, MemoryModel, NoCheck,
    PageTable, PageTableEntry, PagingMode, Slot, TableAllocator,
};
use kernel_pgtable_alloc::BootstrapTableAlloc;
use std::collections::HashSet;
use std::sync::Barrier;
use std::thread;

/// Host memory standing in for the identity-mapped boot window.
struct Window {
    frames: Vec<PageTable>,
}

impl Window {
    fn with_frames(n: usize) -> Self {
        let mut frames = Vec::with_capacity(n);
        for _ in 0..n {
            frames.push(PageTable::new());
        }
        Self { frames }
    }

    fn start(&self) -> PhysicalAddress {
        PhysicalAddress::from_ptr(self.frames.as_ptr())
    }

    fn allocator(&self) -> BootstrapTableAlloc {
        BootstrapTableAlloc::new(self.start(), self.frames.len() as u64 * PAGE_SIZE).unwrap()
    }
}

fn scribble(table: &PageTable) {
    let ops = EntryOps::new(&LocalHart, &NoCheck, Asid::new(0));
    let slot = Slot::new(table.entry(5), Level::L1, VirtualAddress::new(0x5000));
    let leaf = PageTableEntry::zero()
        .with_present(true)
        .with_read(true)
        .with_pfn(Pfn::new(0x1234));
    ops.install(&slot, leaf).unwrap();
    assert!(!table.is_empty());
}

#[test]
fn identity_mapped_bump_allocation() {
    let window = Window::with_frames(2);
    let alloc = window.allocator();
    let start = window.start();

    let a = alloc.alloc_table(Level::L3, VirtualAddress::zero()).unwrap();
    let b = alloc.alloc_table(Level::L2, VirtualAddress::zero()).unwrap();
    assert_eq!(a, start);
    assert_eq!(b, start + PAGE_SIZE);
    assert_eq!(alloc.alloc_table(Level::L1, VirtualAddress::zero()), None);

    let table = unsafe { alloc.table(Level::L2, b) };
    assert!(std::ptr::eq(table, &window.frames[1]));
}

#[test]
fn only_the_last_table_is_reclaimed() {
    let window = Window::with_frames(4);
    let alloc = window.allocator();

    let a = alloc.alloc_table(Level::L1, VirtualAddress::zero()).unwrap();
    let b = alloc.alloc_table(Level::L1, VirtualAddress::zero()).unwrap();
    assert_eq!(alloc.used(), 2);

    alloc.free_table(Level::L1, a);
    assert_eq!(alloc.used(), 2);

    alloc.free_table(Level::L1, b);
    assert_eq!(alloc.used(), 1);
    assert_eq!(alloc.remaining(), 3);
    assert_eq!(
        alloc.alloc_table(Level::L1, VirtualAddress::zero()),
        Some(b)
    );
}

#[test]
fn reclaimed_tables_come_back_zeroed() {
    let window = Window::with_frames(1);
    let alloc = window.allocator();

    let pa = alloc.alloc_table(Level::L1, VirtualAddress::zero()).unwrap();
    scribble(unsafe { alloc.table(Level::L1, pa) });
    alloc.free_table(Level::L1, pa);

    let again = alloc.alloc_table(Level::L1, VirtualAddress::zero()).unwrap();
    assert_eq!(again, pa);
    assert!(unsafe { alloc.table(Level::L1, again) }.is_empty());
}

#[test]
fn harts_never_share_a_table() {
    const HARTS: usize = 8;
    const EACH: usize = 16;

    let window = Window::with_frames(HARTS * EACH);
    let alloc = window.allocator();
    let barrier = Barrier::new(HARTS);

    let handed_out: Vec<PhysicalAddress> = thread::scope(|s| {
        let handles: Vec<_> = (0..HARTS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    (0..EACH)
                        .map(|_| alloc.alloc_table(Level::L1, VirtualAddress::zero()).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let distinct: HashSet<_> = handed_out.iter().copied().collect();
    assert_eq!(distinct.len(), HARTS * EACH);
    assert_eq!(alloc.remaining(), 0);
    assert_eq!(alloc.alloc_table(Level::L1, VirtualAddress::zero()), None);
}

#[test]
fn boots_an_address_space() {
    let window = Window::with_frames(4);
    let alloc = window.allocator();
    let config = AddressSpaceConfig::new(PagingMode::Sv39, MemoryModel::Standard, 0).unwrap();
    let aspace = AddressSpace::new(&config, &alloc, LocalHart, NoCheck, Asid::new(0)).unwrap();

    let kernel = VirtualAddress::new(0xFFFF_FFFF_8000_0000);
    aspace
        .map_range(
            kernel,
            Pfn::new(0x8_0000),
            0x40_0000,
            config.protection().kernel_exec(),
            Level::L2,
        )
        .unwrap();

    assert_eq!(alloc.used(), 2);
    assert_eq!(
        aspace.translate(kernel + 0x20_1234),
        Some(PhysicalAddress::new(0x8020_1234))
    );
    assert_eq!(aspace.satp().root(), window.start());
}
