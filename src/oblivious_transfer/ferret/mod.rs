//! The Ferret RCOT extender: stretches a small batch of base RCOTs into a
//! much larger one under the LPN-with-regular-errors assumption. The matrix
//! side lives in [lpn], the noise side is a [mpcot] built from [spcot]
//! GGM trees, and [extender] glues them together and feeds itself across
//! iterations.

use anyhow::{bail, Result};

pub mod extender;
pub mod lpn;
pub mod mpcot;
pub mod spcot;

/// Default extended output per iteration.
pub const DEFAULT_EXTENDED_SIZE: usize = 10_805_248;
/// Default base RCOT consumed by the matrix multiplication per iteration.
pub const DEFAULT_BASE_SIZE: usize = 589_760;
/// Default regular-noise weight.
pub const DEFAULT_WEIGHT: usize = 1319;

/// The `(extended, base, weight)` parameter set of one extender instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FerretConfig {
    extended_size: usize,
    base_size: usize,
    weight: usize,
}

impl FerretConfig {
    /// Validates a parameter combination. Invalid combinations are a
    /// configuration error and fatal at construction.
    pub fn new(extended_size: usize, base_size: usize, weight: usize) -> Result<Self> {
        if weight == 0 || extended_size % weight != 0 {
            bail!(
                "extended size (={}) must be a multiple of weight (={})",
                extended_size,
                weight
            );
        }
        let spcot_length = extended_size / weight;
        if spcot_length < 2 || !spcot_length.is_power_of_two() {
            bail!(
                "extended size / weight (={}) must be a power of two >= 2",
                spcot_length
            );
        }
        let config = FerretConfig {
            extended_size,
            base_size,
            weight,
        };
        if extended_size <= config.base_cot_size() {
            bail!(
                "extension must grow: extended (={}) <= total base (={})",
                extended_size,
                config.base_cot_size()
            );
        }
        Ok(config)
    }

    /// The published Ferret parameter set.
    pub fn default_config() -> Self {
        // The defaults are known-good; new() cannot reject them.
        FerretConfig {
            extended_size: DEFAULT_EXTENDED_SIZE,
            base_size: DEFAULT_BASE_SIZE,
            weight: DEFAULT_WEIGHT,
        }
    }

    /// Extended output per iteration.
    pub fn extended_size(&self) -> usize {
        self.extended_size
    }

    /// Base RCOT consumed by the matrix multiplication.
    pub fn base_size(&self) -> usize {
        self.base_size
    }

    /// Number of noise positions.
    pub fn weight(&self) -> usize {
        self.weight
    }

    /// Length of each single-point COT block.
    pub fn spcot_length(&self) -> usize {
        self.extended_size / self.weight
    }

    /// GGM tree depth of each single-point COT.
    pub fn spcot_depth(&self) -> usize {
        self.spcot_length().trailing_zeros() as usize
    }

    /// Base RCOT consumed by the multi-point COT per iteration.
    pub fn mpcot_base_size(&self) -> usize {
        self.weight * self.spcot_depth()
    }

    /// Total base RCOT consumed per iteration.
    pub fn base_cot_size(&self) -> usize {
        self.base_size + self.mpcot_base_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FerretConfig::new(DEFAULT_EXTENDED_SIZE, DEFAULT_BASE_SIZE, DEFAULT_WEIGHT)
            .unwrap();
        assert_eq!(config, FerretConfig::default_config());
        assert_eq!(config.spcot_length(), 8192);
        assert_eq!(config.spcot_depth(), 13);
        assert_eq!(config.mpcot_base_size(), 1319 * 13);
        assert_eq!(config.base_cot_size(), 589_760 + 17_147);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        // Not a multiple of weight.
        assert!(FerretConfig::new(1000, 100, 7).is_err());
        // Quotient not a power of two.
        assert!(FerretConfig::new(1200, 100, 10).is_err());
        // Extension does not grow.
        assert!(FerretConfig::new(1024, 1024, 8).is_err());
        // Zero weight.
        assert!(FerretConfig::new(1024, 100, 0).is_err());
    }
}
