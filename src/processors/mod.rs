//! Data processing modules.

pub mod complement;

// Re-export key types for convenience
pub use complement::{
    compute_complement, evaluate_candidates, AlgorithmComplement, ComplementStats, NeighborIndex,
    DEFAULT_THRESHOLD_SQ,
};
