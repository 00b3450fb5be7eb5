//! # Swap Entries
//!
//! A swapped-out page leaves a non-present word in its slot that records
//! where the contents went:
//!
//! ```text
//! 63                               11 10     6 5 4 3   1 0
//! |             offset              |  type   |0|x| 000 |0|
//! ```
//!
//! `V`, the leaf bits and `PROT_NONE` stay clear so the word can never be
//! mistaken for a mapping. `(type 0, offset 0)` would be the empty word and
//! is never produced; offset 0 of every backend holds its header anyway.

use crate::codec::Presence;
use crate::{AddressSpaceConfig, ContractViolation, PageTableEntry};

/// Bits reserved for the backend type.
pub const MAX_SWAPFILES_SHIFT: u32 = 5;

const SWP_TYPE_SHIFT: u32 = 6;
const SWP_TYPE_BITS: u32 = 5;
const SWP_TYPE_MASK: u64 = (1 << SWP_TYPE_BITS) - 1;
const SWP_OFFSET_SHIFT: u32 = SWP_TYPE_SHIFT + SWP_TYPE_BITS;

const _: () = assert!(MAX_SWAPFILES_SHIFT <= SWP_TYPE_BITS);

/// Number of distinct backend types an entry can name.
pub const MAX_SWAP_TYPES: usize = 1 << MAX_SWAPFILES_SHIFT;

/// Largest page offset within one backend.
pub const MAX_SWAP_OFFSET: u64 = u64::MAX >> SWP_OFFSET_SHIFT;

/// `(backend type, page offset)` of a swapped-out page.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SwapEntry {
    ty: u8,
    offset: u64,
}

impl SwapEntry {
    /// `ty` must be below [`MAX_SWAP_TYPES`] (and the configured backend
    /// count) and `offset` at most [`MAX_SWAP_OFFSET`]; the pair must not be
    /// `(0, 0)`. Debug builds assert the fixed limits; [`try_new`](Self::try_new)
    /// checks all of them.
    #[must_use]
    pub const fn new(ty: u8, offset: u64) -> Self {
        debug_assert!((ty as usize) < MAX_SWAP_TYPES);
        debug_assert!(offset <= MAX_SWAP_OFFSET);
        debug_assert!(ty != 0 || offset != 0);
        Self { ty, offset }
    }

    /// [`new`](Self::new) checked against `config`'s backend count.
    ///
    /// # Errors
    /// - [`ContractViolation::SwapTypeOutOfRange`] if `ty` is not below
    ///   [`AddressSpaceConfig::max_swap_backends`].
    /// - [`ContractViolation::SwapOffsetOutOfRange`] if `offset` exceeds
    ///   [`MAX_SWAP_OFFSET`].
    /// - [`ContractViolation::EmptySwapEntry`] for `(0, 0)`.
    pub const fn try_new(
        config: &AddressSpaceConfig,
        ty: u8,
        offset: u64,
    ) -> Result<Self, ContractViolation> {
        let backends = config.max_swap_backends();
        if ty as usize >= backends {
            return Err(ContractViolation::SwapTypeOutOfRange { ty, backends });
        }
        if offset > MAX_SWAP_OFFSET {
            return Err(ContractViolation::SwapOffsetOutOfRange { offset });
        }
        if ty == 0 && offset == 0 {
            return Err(ContractViolation::EmptySwapEntry);
        }
        Ok(Self { ty, offset })
    }

    #[must_use]
    pub const fn ty(self) -> u8 {
        self.ty
    }

    #[must_use]
    pub const fn offset(self) -> u64 {
        self.offset
    }

    /// Read a swap entry back; `None` unless the word classifies as
    /// [`Presence::Swap`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_entry(entry: PageTableEntry) -> Option<Self> {
        if !matches!(Presence::of(entry), Presence::Swap) {
            return None;
        }
        let raw = entry.into_bits();
        Some(Self {
            ty: ((raw >> SWP_TYPE_SHIFT) & SWP_TYPE_MASK) as u8,
            offset: raw >> SWP_OFFSET_SHIFT,
        })
    }

    #[must_use]
    pub const fn into_entry(self) -> PageTableEntry {
        PageTableEntry::from_bits(
            ((self.ty as u64 & SWP_TYPE_MASK) << SWP_TYPE_SHIFT) | (self.offset << SWP_OFFSET_SHIFT),
        )
    }
}

impl From<SwapEntry> for PageTableEntry {
    fn from(value: SwapEntry) -> Self {
        value.into_entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryModel, PagingMode};
    use proptest::prelude::*;

    #[test]
    fn layout() {
        let e = SwapEntry::new(3, 5).into_entry();
        assert_eq!(e.into_bits(), (3 << 6) | (5 << 11));
        assert!(!e.is_present());
        assert!(!e.is_leaf());
        assert_eq!(Presence::of(e), Presence::Swap);
    }

    #[test]
    fn offset_uses_all_upper_bits() {
        assert_eq!(MAX_SWAP_OFFSET, (1 << 53) - 1);
        let e = SwapEntry::new(31, MAX_SWAP_OFFSET).into_entry();
        assert_eq!(e.into_bits(), u64::MAX & !0x3F);
        assert_eq!(
            SwapEntry::from_entry(e),
            Some(SwapEntry::new(31, MAX_SWAP_OFFSET))
        );
    }

    #[test]
    fn try_new_checks_the_configured_backends() {
        let config =
            AddressSpaceConfig::new(PagingMode::Sv39, MemoryModel::Standard, 2).unwrap();

        assert_eq!(SwapEntry::try_new(&config, 1, 0x77), Ok(SwapEntry::new(1, 0x77)));
        assert_eq!(
            SwapEntry::try_new(&config, 2, 0x77),
            Err(ContractViolation::SwapTypeOutOfRange { ty: 2, backends: 2 })
        );
        assert_eq!(
            SwapEntry::try_new(&config, 1, MAX_SWAP_OFFSET + 1),
            Err(ContractViolation::SwapOffsetOutOfRange {
                offset: MAX_SWAP_OFFSET + 1
            })
        );
        assert_eq!(
            SwapEntry::try_new(&config, 0, 0),
            Err(ContractViolation::EmptySwapEntry)
        );

        let none = AddressSpaceConfig::new(PagingMode::Sv39, MemoryModel::Standard, 0).unwrap();
        assert!(SwapEntry::try_new(&none, 0, 1).is_err());
    }

    #[test]
    fn mappings_are_not_swap() {
        assert_eq!(SwapEntry::from_entry(PageTableEntry::zero()), None);
        let leaf = PageTableEntry::zero().with_present(true).with_read(true);
        assert_eq!(SwapEntry::from_entry(leaf), None);
        assert_eq!(SwapEntry::from_entry(leaf.mkinvalid()), None);
        let protnone = PageTableEntry::zero().with_global(true);
        assert_eq!(SwapEntry::from_entry(protnone), None);
    }

    proptest! {
        #[test]
        fn swap_round_trip(ty in 0u8..32, offset in 0..=MAX_SWAP_OFFSET) {
            prop_assume!(ty != 0 || offset != 0);
            let entry = SwapEntry::new(ty, offset).into_entry();
            prop_assert_eq!(SwapEntry::from_entry(entry), Some(SwapEntry::new(ty, offset)));
        }
    }
}
