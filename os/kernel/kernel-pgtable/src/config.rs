//! # Boot-time Paging Configuration
//!
//! Hardware probing decides once which paging mode and which memory-attribute
//! scheme the platform uses. [`AddressSpaceConfig`] captures that decision as
//! an immutable value that every walker and codec call borrows; there is no
//! global mutable state.
//!
//! ```rust
//! # use kernel_pgtable::*;
//! let config = AddressSpaceConfig::new(PagingMode::Sv48, MemoryModel::Svpbmt, 8).unwrap();
//! assert_eq!(config.levels(), 4);
//! assert_eq!(config.root_level(), Level::L4);
//! # use kernel_memory_addresses::VirtualAddress;
//! assert!(config.is_canonical(VirtualAddress::new(0xFFFF_8000_0000_0000)));
//! assert!(!config.is_canonical(VirtualAddress::new(0x0000_8000_0000_0000)));
//! ```

use crate::swap::MAX_SWAP_TYPES;
use crate::{ConfigError, Level, MemoryModel, ProtectionModel};
use kernel_memory_addresses::VirtualAddress;

/// Translation scheme written to `satp.MODE`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PagingMode {
    /// 3 levels, 39-bit virtual addresses.
    Sv39,
    /// 4 levels, 48-bit virtual addresses.
    Sv48,
    /// 5 levels, 57-bit virtual addresses.
    Sv57,
}

impl PagingMode {
    /// Mode for a probed level count.
    ///
    /// # Errors
    /// [`ConfigError::UnsupportedLevels`] for anything but 3, 4 or 5.
    pub const fn from_levels(levels: u8) -> Result<Self, ConfigError> {
        match levels {
            3 => Ok(Self::Sv39),
            4 => Ok(Self::Sv48),
            5 => Ok(Self::Sv57),
            n => Err(ConfigError::UnsupportedLevels(n)),
        }
    }

    /// Mode for a `satp.MODE` field value.
    ///
    /// # Errors
    /// [`ConfigError::UnsupportedSatpMode`] for bare mode (0) and every value
    /// other than 8, 9 or 10.
    pub const fn from_satp_mode(mode: u8) -> Result<Self, ConfigError> {
        match mode {
            8 => Ok(Self::Sv39),
            9 => Ok(Self::Sv48),
            10 => Ok(Self::Sv57),
            n => Err(ConfigError::UnsupportedSatpMode(n)),
        }
    }

    #[must_use]
    pub const fn levels(self) -> u8 {
        match self {
            Self::Sv39 => 3,
            Self::Sv48 => 4,
            Self::Sv57 => 5,
        }
    }

    #[must_use]
    pub const fn root_level(self) -> Level {
        match self {
            Self::Sv39 => Level::L3,
            Self::Sv48 => Level::L4,
            Self::Sv57 => Level::L5,
        }
    }

    #[must_use]
    pub const fn va_bits(self) -> u32 {
        match self {
            Self::Sv39 => 39,
            Self::Sv48 => 48,
            Self::Sv57 => 57,
        }
    }

    #[must_use]
    pub const fn satp_mode(self) -> u8 {
        match self {
            Self::Sv39 => 8,
            Self::Sv48 => 9,
            Self::Sv57 => 10,
        }
    }
}

/// Immutable paging configuration, built once at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpaceConfig {
    mode: PagingMode,
    protection: ProtectionModel,
    max_swap_backends: usize,
}

impl AddressSpaceConfig {
    /// Validate and freeze the probed configuration.
    ///
    /// # Errors
    /// [`ConfigError::SwapTypeTooNarrow`] if `max_swap_backends` does not fit
    /// the swap type field.
    pub fn new(
        mode: PagingMode,
        model: MemoryModel,
        max_swap_backends: usize,
    ) -> Result<Self, ConfigError> {
        if max_swap_backends > MAX_SWAP_TYPES {
            return Err(ConfigError::SwapTypeTooNarrow {
                requested: max_swap_backends,
                max: MAX_SWAP_TYPES,
            });
        }

        log::info!(
            "page tables: {mode:?} ({} levels), {model:?} memory model, {max_swap_backends} swap backends",
            mode.levels()
        );

        Ok(Self {
            mode,
            protection: ProtectionModel::new(model),
            max_swap_backends,
        })
    }

    /// Configuration for a probed level count.
    ///
    /// # Errors
    /// As [`PagingMode::from_levels`] and [`AddressSpaceConfig::new`].
    pub fn from_levels(
        levels: u8,
        model: MemoryModel,
        max_swap_backends: usize,
    ) -> Result<Self, ConfigError> {
        Self::new(PagingMode::from_levels(levels)?, model, max_swap_backends)
    }

    #[must_use]
    pub const fn mode(&self) -> PagingMode {
        self.mode
    }

    #[must_use]
    pub const fn memory_model(&self) -> MemoryModel {
        self.protection.memory_model()
    }

    #[must_use]
    pub const fn protection(&self) -> &ProtectionModel {
        &self.protection
    }

    #[must_use]
    pub const fn levels(&self) -> u8 {
        self.mode.levels()
    }

    #[must_use]
    pub const fn root_level(&self) -> Level {
        self.mode.root_level()
    }

    #[must_use]
    pub const fn va_bits(&self) -> u32 {
        self.mode.va_bits()
    }

    #[must_use]
    pub const fn max_swap_backends(&self) -> usize {
        self.max_swap_backends
    }

    /// Whether `va` is sign-extended from bit `va_bits - 1`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub const fn is_canonical(&self, va: VirtualAddress) -> bool {
        let unused = 64 - self.va_bits();
        let raw = va.as_u64();
        (((raw << unused) as i64) >> unused) as u64 == raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_round_trip() {
        for mode in [PagingMode::Sv39, PagingMode::Sv48, PagingMode::Sv57] {
            assert_eq!(PagingMode::from_levels(mode.levels()), Ok(mode));
            assert_eq!(PagingMode::from_satp_mode(mode.satp_mode()), Ok(mode));
            assert_eq!(mode.root_level().number(), mode.levels());
        }
    }

    #[test]
    fn unsupported_values_are_rejected() {
        assert_eq!(
            PagingMode::from_levels(2),
            Err(ConfigError::UnsupportedLevels(2))
        );
        assert_eq!(
            PagingMode::from_satp_mode(0),
            Err(ConfigError::UnsupportedSatpMode(0))
        );
        assert_eq!(
            AddressSpaceConfig::from_levels(6, MemoryModel::Standard, 0),
            Err(ConfigError::UnsupportedLevels(6))
        );
    }

    #[test]
    fn swap_backends_bounded_by_type_field() {
        assert!(AddressSpaceConfig::new(PagingMode::Sv39, MemoryModel::Standard, 32).is_ok());
        assert_eq!(
            AddressSpaceConfig::new(PagingMode::Sv39, MemoryModel::Standard, 33),
            Err(ConfigError::SwapTypeTooNarrow {
                requested: 33,
                max: 32
            })
        );
    }

    #[test]
    fn canonical_addresses() {
        let sv39 = AddressSpaceConfig::new(PagingMode::Sv39, MemoryModel::Standard, 0).unwrap();
        assert!(sv39.is_canonical(VirtualAddress::new(0x0000_003F_FFFF_FFFF)));
        assert!(sv39.is_canonical(VirtualAddress::new(0xFFFF_FFC0_0000_0000)));
        assert!(!sv39.is_canonical(VirtualAddress::new(0x0000_0040_0000_0000)));

        let sv57 = AddressSpaceConfig::new(PagingMode::Sv57, MemoryModel::Standard, 0).unwrap();
        assert!(sv57.is_canonical(VirtualAddress::new(0x00FF_FFFF_FFFF_F000)));
        assert!(sv57.is_canonical(VirtualAddress::new(0xFF00_0000_0000_0000)));
        assert!(!sv57.is_canonical(VirtualAddress::new(0x0100_0000_0000_0000)));
    }
}
