//! # Protection and Memory-Type Model
//!
//! [`PageProt`] is the non-frame half of an entry. [`ProtectionModel`] turns
//! the abstract access categories (user/kernel, private/shared, `r/w/x`)
//! into concrete `PageProt` values for one [`MemoryModel`], selected once at
//! boot.
//!
//! ## Memory models
//!
//! | Model | Memory-type bits | `io` | `nocache` | default |
//! |---|---|---|---|---|
//! | `Standard` | none | - | - | - |
//! | `Svpbmt` | 61..62 (`PBMT`) | `IO` (2) | `NC` (1) | `PMA` (0) |
//! | `TheadLegacy` | 59..63 (`SEC SH B C SO`) | `SO SH` | `B SH` | `C B SH` |
//!
//! Under `TheadLegacy` the "normal memory" attributes must be set explicitly,
//! so every base descriptor carries `C B SH`, and encoding a protection that
//! names no memory type adds them (see [`ProtectionModel::fixup`]).

use bitflags::bitflags;

bitflags! {
    /// Attribute bits of a page-table entry (everything except the `PPN`).
    ///
    /// The memory-type bits 59..63 are retained as unnamed bits; their
    /// meaning depends on the [`MemoryModel`].
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct PageProt: u64 {
        const PRESENT  = 1 << 0;
        const READ     = 1 << 1;
        const WRITE    = 1 << 2;
        const EXEC     = 1 << 3;
        const USER     = 1 << 4;
        const GLOBAL   = 1 << 5;
        const ACCESSED = 1 << 6;
        const DIRTY    = 1 << 7;
        /// Software: mapping without a page descriptor.
        const SPECIAL  = 1 << 8;
        /// Software: free for the memory manager.
        const SOFT     = 1 << 9;

        const _ = 0xF800_0000_0000_0000;
    }
}

impl PageProt {
    /// `PROT_NONE` marker. Shares the `G` bit; only meaningful while `V` is
    /// clear.
    pub const PROT_NONE: Self = Self::GLOBAL;

    /// Bits that turn a valid entry into a leaf.
    pub const LEAF: Self = Self::READ.union(Self::WRITE).union(Self::EXEC);

    /// Attribute bits of a next-level table pointer.
    pub const TABLE: Self = Self::PRESENT;

    /// Svpbmt `PBMT` field (bits 61..62).
    pub const SVPBMT_MASK: Self = Self::from_bits_retain(3 << 61);
    /// Svpbmt non-cacheable, idempotent, weakly ordered.
    pub const SVPBMT_NC: Self = Self::from_bits_retain(1 << 61);
    /// Svpbmt non-cacheable, non-idempotent, strongly ordered (I/O).
    pub const SVPBMT_IO: Self = Self::from_bits_retain(2 << 61);

    /// T-Head strong order.
    pub const THEAD_SO: Self = Self::from_bits_retain(1 << 63);
    /// T-Head cacheable.
    pub const THEAD_CACHE: Self = Self::from_bits_retain(1 << 62);
    /// T-Head bufferable.
    pub const THEAD_BUF: Self = Self::from_bits_retain(1 << 61);
    /// T-Head shareable.
    pub const THEAD_SHARE: Self = Self::from_bits_retain(1 << 60);
    /// T-Head trustable.
    pub const THEAD_SEC: Self = Self::from_bits_retain(1 << 59);
}

bitflags! {
    /// Abstract access request of a memory region.
    ///
    /// The low four bits index the protection map directly.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct VmFlags: u8 {
        const READ   = 1 << 0;
        const WRITE  = 1 << 1;
        const EXEC   = 1 << 2;
        const SHARED = 1 << 3;
    }
}

/// Memory-attribute scheme of the platform, selected once at boot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum MemoryModel {
    /// No memory-type bits; attributes come from the PMAs.
    #[default]
    Standard,
    /// Ratified `Svpbmt` extension.
    Svpbmt,
    /// Vendor attribute bits in 59..63 used by older T-Head cores.
    TheadLegacy,
}

impl MemoryModel {
    /// All memory-type bits this model uses.
    #[must_use]
    pub const fn mt_mask(self) -> PageProt {
        match self {
            Self::Standard => PageProt::empty(),
            Self::Svpbmt => PageProt::SVPBMT_MASK,
            Self::TheadLegacy => PageProt::THEAD_SO
                .union(PageProt::THEAD_CACHE)
                .union(PageProt::THEAD_BUF)
                .union(PageProt::THEAD_SHARE)
                .union(PageProt::THEAD_SEC),
        }
    }

    /// Attributes of device memory.
    #[must_use]
    pub const fn io(self) -> PageProt {
        match self {
            Self::Standard => PageProt::empty(),
            Self::Svpbmt => PageProt::SVPBMT_IO,
            Self::TheadLegacy => PageProt::THEAD_SO.union(PageProt::THEAD_SHARE),
        }
    }

    /// Attributes of non-cacheable normal memory.
    #[must_use]
    pub const fn nocache(self) -> PageProt {
        match self {
            Self::Standard => PageProt::empty(),
            Self::Svpbmt => PageProt::SVPBMT_NC,
            Self::TheadLegacy => PageProt::THEAD_BUF.union(PageProt::THEAD_SHARE),
        }
    }

    /// Attributes of ordinary cacheable memory.
    #[must_use]
    pub const fn pma(self) -> PageProt {
        match self {
            Self::Standard | Self::Svpbmt => PageProt::empty(),
            Self::TheadLegacy => PageProt::THEAD_CACHE
                .union(PageProt::THEAD_BUF)
                .union(PageProt::THEAD_SHARE),
        }
    }
}

/// Protection descriptors resolved for one [`MemoryModel`].
///
/// Built once inside [`AddressSpaceConfig`](crate::AddressSpaceConfig);
/// nothing downstream branches on the memory model again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionModel {
    model: MemoryModel,
    base: PageProt,
    none: PageProt,
    kernel: PageProt,
    map: [PageProt; 16],
}

impl ProtectionModel {
    #[must_use]
    pub fn new(model: MemoryModel) -> Self {
        let extra = model.pma();
        let base = PageProt::PRESENT | PageProt::ACCESSED | PageProt::USER | extra;
        let none = PageProt::PROT_NONE | PageProt::READ | extra;
        let kernel = PageProt::READ
            | PageProt::WRITE
            | PageProt::PRESENT
            | PageProt::ACCESSED
            | PageProt::DIRTY
            | PageProt::GLOBAL
            | extra;

        let read = base | PageProt::READ;
        let write = base | PageProt::READ | PageProt::WRITE;
        let exec = base | PageProt::EXEC;
        let read_exec = base | PageProt::READ | PageProt::EXEC;
        let write_exec = base | PageProt::READ | PageProt::EXEC | PageProt::WRITE;

        // Indexed by `shared:x:w:r`. Private writable mappings start out
        // read-only so the first write faults and copies.
        let map = [
            none, read, read, read, exec, read_exec, exec, read_exec, //
            none, read, write, write, exec, read_exec, write_exec, write_exec,
        ];

        Self {
            model,
            base,
            none,
            kernel,
            map,
        }
    }

    #[must_use]
    pub const fn memory_model(&self) -> MemoryModel {
        self.model
    }

    /// `PRESENT | ACCESSED | USER` plus the model's default attributes.
    #[must_use]
    pub const fn base(&self) -> PageProt {
        self.base
    }

    #[must_use]
    pub const fn none(&self) -> PageProt {
        self.none
    }

    #[must_use]
    pub fn read(&self) -> PageProt {
        self.base | PageProt::READ
    }

    #[must_use]
    pub fn write(&self) -> PageProt {
        self.base | PageProt::READ | PageProt::WRITE
    }

    #[must_use]
    pub fn exec(&self) -> PageProt {
        self.base | PageProt::EXEC
    }

    #[must_use]
    pub fn read_exec(&self) -> PageProt {
        self.base | PageProt::READ | PageProt::EXEC
    }

    #[must_use]
    pub fn write_exec(&self) -> PageProt {
        self.base | PageProt::READ | PageProt::EXEC | PageProt::WRITE
    }

    /// Private writable mapping before the first write.
    #[must_use]
    pub fn copy(&self) -> PageProt {
        self.read()
    }

    #[must_use]
    pub fn copy_exec(&self) -> PageProt {
        self.exec()
    }

    #[must_use]
    pub fn copy_read_exec(&self) -> PageProt {
        self.read_exec()
    }

    #[must_use]
    pub fn shared(&self) -> PageProt {
        self.write()
    }

    #[must_use]
    pub fn shared_exec(&self) -> PageProt {
        self.write_exec()
    }

    /// Global, pre-dirtied, kernel read/write.
    #[must_use]
    pub const fn kernel(&self) -> PageProt {
        self.kernel
    }

    #[must_use]
    pub fn kernel_read(&self) -> PageProt {
        self.kernel - PageProt::WRITE
    }

    #[must_use]
    pub fn kernel_exec(&self) -> PageProt {
        self.kernel | PageProt::EXEC
    }

    #[must_use]
    pub fn kernel_read_exec(&self) -> PageProt {
        (self.kernel - PageProt::WRITE) | PageProt::EXEC
    }

    /// Kernel mapping of device memory.
    #[must_use]
    pub fn kernel_io(&self) -> PageProt {
        (self.kernel - self.model.mt_mask()) | self.model.io()
    }

    #[must_use]
    pub const fn table(&self) -> PageProt {
        PageProt::TABLE
    }

    /// The 16-entry private/shared × `x:w:r` map.
    #[must_use]
    pub const fn protection_map(&self) -> &[PageProt; 16] {
        &self.map
    }

    /// Protection of a user mapping with the given access flags.
    #[must_use]
    pub const fn vm_get_page_prot(&self, flags: VmFlags) -> PageProt {
        self.map[(flags.bits() & 0xF) as usize]
    }

    /// Replace the memory type with strongly ordered device memory.
    #[must_use]
    pub fn noncached(&self, prot: PageProt) -> PageProt {
        (prot - self.model.mt_mask()) | self.model.io()
    }

    /// Replace the memory type with non-cacheable normal memory.
    #[must_use]
    pub fn writecombine(&self, prot: PageProt) -> PageProt {
        (prot - self.model.mt_mask()) | self.model.nocache()
    }

    /// Bits a protection-only rewrite keeps from the old entry: the frame,
    /// `A`, `D` and the software bits.
    #[must_use]
    pub fn chg_mask(&self) -> u64 {
        !(PageProt::PRESENT
            | PageProt::READ
            | PageProt::WRITE
            | PageProt::EXEC
            | PageProt::USER
            | PageProt::GLOBAL)
            .bits()
            & !self.model.mt_mask().bits()
    }

    /// Add the default memory attributes to a protection that names none.
    ///
    /// Only `TheadLegacy` needs this; for the other models it is the
    /// identity.
    #[must_use]
    pub fn fixup(&self, prot: PageProt) -> PageProt {
        match self.model {
            MemoryModel::TheadLegacy if !prot.intersects(self.model.mt_mask()) => {
                prot | self.model.pma()
            }
            _ => prot,
        }
    }
}
