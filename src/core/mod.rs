//! Core data types, label codec and I/O operations.

pub mod labels;
pub mod loaders;
pub mod writers;

pub use labels::{split_by_dynamic, DynamicClassSet, SemanticLabel};
pub use loaders::{load_cloud, LabeledPoint, LoaderError, PointCloud};
pub use writers::{write_cloud, write_labels_csv, write_pcd, write_ply, WriteError};
