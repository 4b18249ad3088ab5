//! Core types for the canopy leaf ingestion service.
//!
//! This crate provides the foundational types used throughout canopy:
//! - Leaf values and the [`LeafRecord`] entity with its mapping rules
//! - The flat-array tree layout ([`TreeLayout`]) that derives node
//!   indices from leaf indices
//! - The ingestion [`Checkpoint`] singleton
//! - Configuration with validation
//! - Postcard codec helpers

#![deny(unsafe_code)]

pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod leaf;
pub mod tree;
pub mod value;

pub use checkpoint::{Checkpoint, LatestLeaf};
pub use config::{ConfigError, TreeConfig};
pub use leaf::{LeafCandidate, LeafError, LeafRecord};
pub use tree::{LayoutError, TreeLayout};
pub use value::{LeafValue, ZERO_VALUE, value_hex};
