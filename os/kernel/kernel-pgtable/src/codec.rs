//! # Entry Codec
//!
//! `(frame, protection) ⇄ PageTableEntry`, with the configured memory model
//! applied on the way in. The codec never touches memory; [`EntryOps`]
//! stores what it produces.
//!
//! ```rust
//! # use kernel_pgtable::*;
//! let config = AddressSpaceConfig::new(PagingMode::Sv39, MemoryModel::Standard, 0).unwrap();
//! let prot = config.protection().write();
//! let e = encode(&config, Pfn::new(0x8_0200), prot, Level::L1);
//! let d = decode(&config, e, Level::L1);
//! assert_eq!(d.frame, Pfn::new(0x8_0200));
//! assert_eq!(d.prot, prot);
//! assert_eq!(d.presence, Presence::Leaf);
//! ```
//!
//! [`EntryOps`]: crate::EntryOps

use crate::entry::{MAX_PFN, PFN_MASK, PFN_SHIFT};
use crate::{AddressSpaceConfig, ContractViolation, Level, PageProt, PageTableEntry};
use kernel_memory_addresses::Pfn;

/// How a raw word is to be read.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Presence {
    /// Word is zero.
    None,
    /// Valid pointer to the next level.
    Table,
    /// Valid leaf; a huge mapping above L1.
    Leaf,
    /// Mapping made inaccessible for NUMA hinting (`V=0`, `PROT_NONE=1`).
    ProtNone,
    /// Leaf bits kept with `V` and `PROT_NONE` cleared, e.g. a huge entry
    /// being split.
    Invalidated,
    /// Everything mapping-related clear, word non-zero: a swap entry.
    Swap,
}

impl Presence {
    /// Classify `entry`.
    #[must_use]
    pub const fn of(entry: PageTableEntry) -> Self {
        if entry.is_none() {
            Self::None
        } else if entry.present() {
            if entry.is_leaf() {
                Self::Leaf
            } else {
                Self::Table
            }
        } else if entry.is_protnone() {
            Self::ProtNone
        } else if entry.is_leaf() {
            Self::Invalidated
        } else {
            Self::Swap
        }
    }

    /// The word still owns a frame (possibly not currently translated).
    #[must_use]
    pub const fn maps_frame(self) -> bool {
        matches!(
            self,
            Self::Table | Self::Leaf | Self::ProtNone | Self::Invalidated
        )
    }
}

/// Result of [`decode`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Decoded {
    /// Frame the entry refers to; for a huge leaf, its first frame.
    /// Zero for [`Presence::None`] and meaningless for [`Presence::Swap`].
    pub frame: Pfn,
    /// Attribute bits.
    pub prot: PageProt,
    pub presence: Presence,
}

/// Build a leaf (or `PROT_NONE`) entry at `level`.
///
/// `frame` must fit 44 bits and, above L1, be aligned to the pages the leaf
/// covers. Debug builds assert both; release builds truncate the frame as the
/// hardware field would. Use [`try_encode`] to get the check as an error.
#[must_use]
pub fn encode(
    config: &AddressSpaceConfig,
    frame: Pfn,
    prot: PageProt,
    level: Level,
) -> PageTableEntry {
    debug_assert!(
        frame.as_u64() <= MAX_PFN,
        "frame {frame:?} exceeds the PPN field"
    );
    debug_assert!(
        frame.is_aligned(level.pages()),
        "frame {frame:?} misaligned for {level:?}"
    );
    let prot = config.protection().fixup(prot);
    PageTableEntry::from_bits(
        ((frame.as_u64() << PFN_SHIFT) & PFN_MASK) | (prot.bits() & !PFN_MASK),
    )
}

/// [`encode`] with the frame contract checked.
///
/// # Errors
/// - [`ContractViolation::FrameOutOfRange`] if `frame` exceeds 44 bits.
/// - [`ContractViolation::MisalignedFrame`] if a huge leaf's frame is not
///   aligned to its size.
pub fn try_encode(
    config: &AddressSpaceConfig,
    frame: Pfn,
    prot: PageProt,
    level: Level,
) -> Result<PageTableEntry, ContractViolation> {
    if frame.as_u64() > MAX_PFN {
        log::warn!("refusing to encode {frame:?}: beyond the PPN field");
        return Err(ContractViolation::FrameOutOfRange { pfn: frame });
    }
    if !frame.is_aligned(level.pages()) {
        log::warn!("refusing to encode {frame:?}: misaligned for {level:?}");
        return Err(ContractViolation::MisalignedFrame { pfn: frame, level });
    }
    Ok(encode(config, frame, prot, level))
}

/// Build a pointer to a next-level table.
///
/// Table pointers carry no memory-type bits under any model.
#[must_use]
pub fn encode_table(_config: &AddressSpaceConfig, frame: Pfn) -> PageTableEntry {
    debug_assert!(frame.as_u64() <= MAX_PFN);
    PageTableEntry::from_bits(((frame.as_u64() << PFN_SHIFT) & PFN_MASK) | PageProt::TABLE.bits())
}

/// Split an entry read at `level`.
#[must_use]
pub fn decode(_config: &AddressSpaceConfig, entry: PageTableEntry, level: Level) -> Decoded {
    let presence = Presence::of(entry);
    let frame = match presence {
        Presence::None => Pfn::new(0),
        Presence::Leaf | Presence::ProtNone | Presence::Invalidated => {
            entry.leaf_frame_base(level)
        }
        Presence::Table | Presence::Swap => entry.pfn(),
    };
    Decoded {
        frame,
        prot: entry.prot(),
        presence,
    }
}

/// Rewrite the protection of `entry`, keeping the frame, `A`, `D` and the
/// software bits.
///
/// Status bits named in `prot` are added, never cleared: clearing `A` or `D`
/// takes an explicit [`PageTableEntry::mkold`] / [`PageTableEntry::mkclean`].
#[must_use]
pub fn modify(config: &AddressSpaceConfig, entry: PageTableEntry, prot: PageProt) -> PageTableEntry {
    let model = config.protection();
    let prot = model.fixup(prot);
    PageTableEntry::from_bits((entry.into_bits() & model.chg_mask()) | (prot.bits() & !PFN_MASK))
}
