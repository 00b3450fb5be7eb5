//! # TLB and Instruction-Cache Maintenance
//!
//! RISC-V hardware walkers may cache translations (including, on some
//! implementations, *invalid* ones) until an `sfence.vma` orders the page
//! table writes before later implicit reads. Instruction fetch is not
//! coherent with stores either: a freshly installed executable page needs a
//! `fence.i` before it is fetched from.
//!
//! [`TlbSync`] is the seam through which [`EntryOps`](crate::EntryOps)
//! discharges both obligations. [`LocalHart`] is the implementation for the
//! executing hart; a kernel with remote shootdowns supplies its own.

use crate::PageTableEntry;
use kernel_memory_addresses::VirtualAddress;

/// Synchronization obligations of page-table transitions.
pub trait TlbSync {
    /// Order prior page-table stores before later translations of `va` on
    /// this hart and drop any cached translation for it.
    fn flush_tlb_page(&self, va: VirtualAddress);

    /// Make the frame of `entry` coherent for instruction fetch.
    fn flush_icache(&self, entry: PageTableEntry);
}

/// Fences on the executing hart only.
///
/// On hosts without RISC-V instructions both operations degrade to a
/// sequentially consistent fence.
#[derive(Debug, Default, Copy, Clone)]
pub struct LocalHart;

impl TlbSync for LocalHart {
    #[inline]
    fn flush_tlb_page(&self, va: VirtualAddress) {
        // SAFETY: `sfence.vma` only orders and invalidates translations.
        #[cfg(all(feature = "asm", target_arch = "riscv64"))]
        unsafe {
            core::arch::asm!("sfence.vma {0}, zero", in(reg) va.as_u64(), options(nostack, preserves_flags));
        }

        #[cfg(not(all(feature = "asm", target_arch = "riscv64")))]
        {
            let _ = va;
            core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
        }
    }

    #[inline]
    fn flush_icache(&self, _entry: PageTableEntry) {
        // SAFETY: `fence.i` has no operands and no memory effects.
        #[cfg(all(feature = "asm", target_arch = "riscv64"))]
        unsafe {
            core::arch::asm!("fence.i", options(nostack, preserves_flags));
        }

        #[cfg(not(all(feature = "asm", target_arch = "riscv64")))]
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    }
}

impl<T: TlbSync + ?Sized> TlbSync for &T {
    #[inline]
    fn flush_tlb_page(&self, va: VirtualAddress) {
        (**self).flush_tlb_page(va);
    }

    #[inline]
    fn flush_icache(&self, entry: PageTableEntry) {
        (**self).flush_icache(entry);
    }
}
