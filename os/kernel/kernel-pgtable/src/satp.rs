use crate::{ConfigError, PagingMode};
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// Address-space identifier carried in `satp.ASID`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Asid(u16);

impl Asid {
    #[must_use]
    pub const fn new(v: u16) -> Self {
        Self(v)
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// `satp` — Supervisor Address Translation and Protection (RV64).
///
/// Selects the paging mode, the current ASID and the physical frame of the
/// root page table.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Satp {
    /// Bits 0–43 — root table physical address >> 12.
    #[bits(44)]
    pub ppn: u64,

    /// Bits 44–59 — address-space identifier.
    #[bits(16)]
    pub asid: u16,

    /// Bits 60–63 — translation mode (0 bare, 8 Sv39, 9 Sv48, 10 Sv57).
    #[bits(4)]
    pub mode: u8,
}

impl Satp {
    /// `satp` value selecting the table rooted at `root`.
    ///
    /// `root` must be 4 KiB-aligned.
    #[must_use]
    pub fn for_root(mode: PagingMode, asid: Asid, root: PhysicalAddress) -> Self {
        debug_assert!(root.is_page_aligned(), "root table must be 4K-aligned");
        Self::new()
            .with_ppn(root.pfn().as_u64())
            .with_asid(asid.as_u16())
            .with_mode(mode.satp_mode())
    }

    /// Physical address of the root table.
    #[must_use]
    pub const fn root(self) -> PhysicalAddress {
        PhysicalAddress::new(self.ppn() << 12)
    }

    #[must_use]
    pub const fn address_space_id(self) -> Asid {
        Asid::new(self.asid())
    }

    /// Paging mode named by the `MODE` field.
    ///
    /// # Errors
    /// [`ConfigError::UnsupportedSatpMode`] for bare mode and reserved values.
    pub const fn paging_mode(self) -> Result<PagingMode, ConfigError> {
        PagingMode::from_satp_mode(self.mode())
    }
}

#[cfg(all(feature = "asm", target_arch = "riscv64"))]
impl Satp {
    /// Read the current `satp`.
    ///
    /// # Safety
    /// Must run in S-mode.
    #[must_use]
    pub unsafe fn load_unsafe() -> Self {
        let satp: u64;
        unsafe {
            core::arch::asm!("csrr {}, satp", out(reg) satp, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(satp)
    }

    /// Write `satp` and order the switch against later translations.
    ///
    /// # Safety
    /// The new tables must map the code executing this and everything it
    /// touches next.
    pub unsafe fn store_unsafe(self) {
        let satp = self.into_bits();
        unsafe {
            core::arch::asm!(
                "csrw satp, {}",
                "sfence.vma zero, zero",
                in(reg) satp,
                options(nostack, preserves_flags)
            );
        }
    }
}
