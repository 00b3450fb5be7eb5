use crate::{Level, PageTableEntry};
use kernel_memory_addresses::{Pfn, VirtualAddress};

/// Rejected boot-time configuration.
///
/// These are fatal: the boot path is expected to panic on them. They are
/// returned as values so the caller chooses how.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Only Sv39, Sv48 and Sv57 (3, 4 and 5 levels) exist.
    #[error("unsupported number of paging levels: {0}")]
    UnsupportedLevels(u8),
    /// `satp.MODE` value that does not name Sv39, Sv48 or Sv57.
    #[error("unsupported satp mode: {0}")]
    UnsupportedSatpMode(u8),
    /// More swap backends configured than the type field can name.
    #[error("swap type field holds {max} backends, {requested} configured")]
    SwapTypeTooNarrow { requested: usize, max: usize },
}

/// A caller broke the encoding contract.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    /// The frame number does not fit the 44-bit `PPN` field.
    #[error("frame {pfn:?} exceeds the 44-bit PPN field")]
    FrameOutOfRange { pfn: Pfn },
    /// A huge leaf must reference a frame aligned to the size it maps.
    #[error("frame {pfn:?} is not aligned for a leaf at {level:?}")]
    MisalignedFrame { pfn: Pfn, level: Level },
    /// The swap type names no configured backend.
    #[error("swap type {ty} out of range, {backends} backends configured")]
    SwapTypeOutOfRange { ty: u8, backends: usize },
    /// The offset does not fit above the swap type field.
    #[error("swap offset {offset:#x} exceeds the entry")]
    SwapOffsetOutOfRange { offset: u64 },
    /// `(type 0, offset 0)` would encode as the empty word.
    #[error("swap entry (0, 0) is indistinguishable from an empty slot")]
    EmptySwapEntry,
}

/// A single-entry transition was refused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The slot already maps a different frame or links a table; it has to
    /// be cleared first.
    #[error("slot holds {old:?}, refusing to install {new:?}")]
    SlotOccupied {
        old: PageTableEntry,
        new: PageTableEntry,
    },
}

/// Failure while walking or mutating an address space.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkError {
    /// The allocator strategy had no table for this level.
    #[error("out of page-table memory at {level:?}")]
    OutOfMemory { level: Level },
    /// The address is not sign-extended from the top VA bit.
    #[error("non-canonical virtual address {va:?}")]
    NonCanonical { va: VirtualAddress },
    /// The requested level does not exist under the configured paging mode.
    #[error("{level:?} is above the root level")]
    LevelOutOfRange { level: Level },
    /// A leaf (or a non-present, non-empty entry) at a higher level covers
    /// the address, so the requested level cannot be reached.
    #[error("{entry:?} at {level:?} blocks the walk")]
    LeafOccupied { level: Level, entry: PageTableEntry },
    /// Nothing is mapped at the address.
    #[error("nothing mapped at {va:?}")]
    NotMapped { va: VirtualAddress },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}
