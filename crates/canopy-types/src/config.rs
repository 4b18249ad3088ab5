//! Configuration for the ingestion pipeline.
//!
//! Loaded from TOML via serde. Values are validated after
//! deserialization with [`TreeConfig::validate`]; construction through
//! [`TreeConfig::new`] validates eagerly.

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::tree::{LayoutError, TreeLayout};

/// Configuration validation error.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {source}"))]
    Validation {
        /// The underlying layout error.
        source: LayoutError,
    },
}

/// Tree and recovery configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Height of the append-only tree.
    #[serde(default = "default_tree_height")]
    pub tree_height: u32,

    /// Ledger block at which the tree contract was deployed. Recovery
    /// falls back to this block when no leaf has ever been ingested.
    #[serde(default)]
    pub genesis_block: u64,
}

impl TreeConfig {
    /// Creates a validated configuration.
    pub fn new(tree_height: u32, genesis_block: u64) -> Result<Self, ConfigError> {
        let config = Self { tree_height, genesis_block };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        TreeLayout::new(self.tree_height).map_err(|source| ConfigError::Validation { source })?;
        Ok(())
    }

    /// The tree layout this configuration describes.
    ///
    /// Callers should `validate()` first; an invalid height surfaces
    /// here as the same error.
    pub fn layout(&self) -> Result<TreeLayout, ConfigError> {
        TreeLayout::new(self.tree_height).map_err(|source| ConfigError::Validation { source })
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { tree_height: default_tree_height(), genesis_block: 0 }
    }
}

fn default_tree_height() -> u32 {
    32
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TreeConfig::default();
        config.validate().expect("default config should validate");
        assert_eq!(config.tree_height, 32);
        assert_eq!(config.genesis_block, 0);
    }

    #[test]
    fn test_zero_height_rejected() {
        assert!(TreeConfig::new(0, 0).is_err());
    }

    #[test]
    fn test_layout_matches_height() {
        let config = TreeConfig::new(8, 1000).unwrap();
        assert_eq!(config.layout().unwrap().leaf_capacity(), 256);
    }
}
