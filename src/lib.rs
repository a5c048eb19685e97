//! Evaluation of dynamic-object-removal static maps.
//!
//! Given a raw reference map and the static maps produced by several removal
//! algorithms, this crate finds, per algorithm, the static reference points
//! that are missing from its output. It provides:
//! - Loading and writing labeled PCD, PLY and CSV point clouds
//! - Decoding packed semantic labels and classifying dynamic classes
//! - KD-tree based complement computation
//! - Periodic re-publishing of the computed complements
//!
//! # Example
//!
//! ```no_run
//! use map_complement::core::{load_cloud, DynamicClassSet};
//! use map_complement::processors::complement::{compute_complement, DEFAULT_THRESHOLD_SQ};
//!
//! let raw = load_cloud("raw_map.pcd").unwrap();
//! let erasor = load_cloud("erasor.pcd").unwrap();
//! let missing = compute_complement(&erasor, &raw, &DynamicClassSet::default(), DEFAULT_THRESHOLD_SQ);
//! println!("{} static points missing", missing.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod publish;
pub mod visualization;

pub use crate::config::{CompareConfig, ComplementConfig, InputConfig, LabelConfig, PublishConfig};
pub use crate::core::labels::{DynamicClassSet, SemanticLabel};
pub use crate::core::loaders::{LabeledPoint, PointCloud};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
