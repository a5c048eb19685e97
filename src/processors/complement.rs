//! Complement computation between a reference map and a candidate static map.
//!
//! The complement of a candidate is the set of *static* reference points that
//! have no close match in the candidate: points the removal algorithm wrongly
//! deleted. For each reference point:
//!
//! 1. Query the nearest candidate point with a `kiddo` KD-tree
//!    (`SquaredEuclidean` metric)
//! 2. Keep the point if its class is static and the squared distance exceeds
//!    the threshold
//!
//! An empty candidate has no index; every query reports an infinite distance,
//! so all static reference points end up in the complement.
//!
//! Points with a non-finite coordinate (PCL writes invalid points as `nan`)
//! are never indexed and never reported.
//!
//! # Example
//!
//! ```
//! use map_complement::core::{DynamicClassSet, PointCloud};
//! use map_complement::processors::complement::compute_complement;
//!
//! let mut reference = PointCloud::new();
//! reference.push(5.0, 5.0, 5.0, 0);
//! let mut candidate = PointCloud::new();
//! candidate.push(0.0, 0.0, 0.0, 0);
//!
//! let missing = compute_complement(&candidate, &reference, &DynamicClassSet::default(), 0.03);
//! assert_eq!(missing.len(), 1);
//! ```

use kiddo::{ImmutableKdTree, SquaredEuclidean};

use crate::config::ComplementConfig;
use crate::core::labels::DynamicClassSet;
use crate::core::loaders::PointCloud;

/// Default squared-distance tolerance (≈0.173 linear units).
pub const DEFAULT_THRESHOLD_SQ: f32 = 0.03;

/// Candidates with at most this many points are scanned linearly.
const LINEAR_SCAN_MAX: usize = 32;

/// Nearest-neighbor index over one candidate cloud.
///
/// Built once per comparison and dropped when that comparison finishes.
pub enum NeighborIndex {
    /// No points: every query is unmatched.
    Empty,
    /// Small clouds, brute force.
    Linear(Vec<[f32; 3]>),
    /// kiddo KD-tree for larger clouds.
    KdTree(ImmutableKdTree<f32, 3>),
}

impl NeighborIndex {
    /// Build an index over the finite points of `cloud`.
    pub fn build(cloud: &PointCloud) -> Self {
        let coords: Vec<[f32; 3]> = cloud.iter().map(|p| p.coords()).filter(is_finite).collect();
        if coords.is_empty() {
            NeighborIndex::Empty
        } else if coords.len() <= LINEAR_SCAN_MAX {
            NeighborIndex::Linear(coords)
        } else {
            NeighborIndex::KdTree(ImmutableKdTree::new_from_slice(&coords))
        }
    }

    /// Squared distance to the nearest indexed point, or `f32::INFINITY` when
    /// the index is empty.
    #[inline]
    pub fn nearest_distance_sq(&self, query: &[f32; 3]) -> f32 {
        match self {
            NeighborIndex::Empty => f32::INFINITY,
            NeighborIndex::Linear(points) => points
                .iter()
                .map(|p| squared_distance(p, query))
                .fold(f32::INFINITY, f32::min),
            NeighborIndex::KdTree(tree) => tree.nearest_one::<SquaredEuclidean>(query).distance,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, NeighborIndex::Empty)
    }
}

#[inline]
fn is_finite(coords: &[f32; 3]) -> bool {
    coords.iter().all(|c| c.is_finite())
}

#[inline]
fn squared_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Compute the reference points missing from `candidate`.
///
/// # Arguments
///
/// * `candidate` - Estimated static map produced by a removal algorithm
/// * `reference` - Ground-truth map
/// * `classes` - Semantic classes excluded as dynamic
/// * `threshold_sq` - Squared-distance tolerance; a point is unmatched when
///   its nearest candidate point is strictly farther than this
///
/// # Returns
///
/// The static, unmatched subset of `reference`, in reference order. Reference
/// points with a non-finite coordinate are skipped.
pub fn compute_complement(
    candidate: &PointCloud,
    reference: &PointCloud,
    classes: &DynamicClassSet,
    threshold_sq: f32,
) -> PointCloud {
    let mut complement = PointCloud::new();
    if reference.is_empty() {
        return complement;
    }

    let index = NeighborIndex::build(candidate);
    if index.is_empty() {
        log::debug!("empty candidate cloud, every static reference point is unmatched");
    }

    for point in reference.iter() {
        // class test first: dynamic points are dropped regardless of distance
        if classes.is_dynamic_label(point.label) {
            continue;
        }
        let coords = point.coords();
        if !is_finite(&coords) {
            continue;
        }
        if index.nearest_distance_sq(&coords) > threshold_sq {
            complement.push_point(point);
        }
    }

    complement
}

/// Summary numbers for one candidate comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplementStats {
    /// All points in the reference map.
    pub reference_points: usize,
    /// Reference points whose class is static and whose coordinates are finite.
    pub static_points: usize,
    /// Static reference points missing from the candidate.
    pub complement_points: usize,
}

impl ComplementStats {
    pub fn new(reference: &PointCloud, classes: &DynamicClassSet, complement: &PointCloud) -> Self {
        let static_points = reference
            .iter()
            .filter(|p| classes.is_static_label(p.label) && is_finite(&p.coords()))
            .count();
        Self {
            reference_points: reference.len(),
            static_points,
            complement_points: complement.len(),
        }
    }

    /// Fraction of static reference points the candidate kept, in `[0, 1]`.
    /// Defined as 1.0 when the reference has no static points.
    pub fn preserved_ratio(&self) -> f64 {
        if self.static_points == 0 {
            1.0
        } else {
            1.0 - self.complement_points as f64 / self.static_points as f64
        }
    }
}

/// Complement result for one named algorithm.
#[derive(Debug, Clone)]
pub struct AlgorithmComplement {
    /// Algorithm name, e.g. `erasor`.
    pub name: String,
    /// Publishing channel, `<name>/static`.
    pub channel: String,
    pub complement: PointCloud,
    pub stats: ComplementStats,
}

/// Channel name a complement set is emitted on.
pub fn static_channel(name: &str) -> String {
    format!("{}/static", name)
}

/// Compute the complement of every candidate against the same reference.
///
/// Candidates are processed in order, one at a time; each comparison builds
/// and drops its own index.
pub fn evaluate_candidates<'a, I>(
    reference: &PointCloud,
    candidates: I,
    classes: &DynamicClassSet,
    config: &ComplementConfig,
) -> Vec<AlgorithmComplement>
where
    I: IntoIterator<Item = (&'a str, &'a PointCloud)>,
{
    let threshold_sq = config.effective_threshold_sq();

    candidates
        .into_iter()
        .map(|(name, candidate)| {
            let complement = compute_complement(candidate, reference, classes, threshold_sq);
            let stats = ComplementStats::new(reference, classes, &complement);
            log::info!(
                "{}: {} of {} static reference points missing ({:.2}% preserved)",
                name,
                stats.complement_points,
                stats.static_points,
                stats.preserved_ratio() * 100.0
            );
            AlgorithmComplement {
                name: name.to_string(),
                channel: static_channel(name),
                complement,
                stats,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::LabeledPoint;

    fn cloud(points: &[(f32, f32, f32, u32)]) -> PointCloud {
        points
            .iter()
            .map(|&(x, y, z, label)| LabeledPoint::new(x, y, z, label))
            .collect()
    }

    /// Deterministic pseudo-random cloud (LCG) with a mix of static and dynamic labels.
    fn random_cloud(n: usize, seed: u64) -> PointCloud {
        let mut state = seed;
        let mut next = || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) as f32) / (u32::MAX >> 1) as f32
        };
        let mut out = PointCloud::with_capacity(n);
        for i in 0..n {
            let label = if i % 7 == 0 { 252 + (i as u32 % 8) } else { 40 + (i as u32 % 10) };
            out.push(next() * 4.0, next() * 4.0, next() * 2.0, label);
        }
        out
    }

    fn brute_force(candidate: &PointCloud, reference: &PointCloud, classes: &DynamicClassSet, t: f32) -> PointCloud {
        let coords = candidate.to_coords();
        reference
            .iter()
            .filter(|p| classes.is_static_label(p.label))
            .filter(|p| {
                coords
                    .iter()
                    .map(|c| squared_distance(c, &p.coords()))
                    .fold(f32::INFINITY, f32::min)
                    > t
            })
            .collect()
    }

    #[test]
    fn test_exact_match_and_dynamic_excluded() {
        let reference = cloud(&[(0.0, 0.0, 0.0, 0), (1.0, 1.0, 1.0, 252)]);
        let candidate = cloud(&[(0.0, 0.0, 0.0, 0)]);

        let out = compute_complement(&candidate, &reference, &DynamicClassSet::default(), 0.03);
        assert!(out.is_empty());
    }

    #[test]
    fn test_far_point_reported() {
        let reference = cloud(&[(5.0, 5.0, 5.0, 0)]);
        let candidate = cloud(&[(0.0, 0.0, 0.0, 0)]);

        let out = compute_complement(&candidate, &reference, &DynamicClassSet::default(), 0.03);
        assert_eq!(out, cloud(&[(5.0, 5.0, 5.0, 0)]));
    }

    #[test]
    fn test_threshold_is_squared_distance() {
        // 0.15 linear -> 0.0225 squared, inside the default tolerance
        let reference = cloud(&[(0.15, 0.0, 0.0, 40), (0.2, 0.0, 0.0, 40)]);
        let candidate = cloud(&[(0.0, 0.0, 0.0, 40)]);

        let out = compute_complement(&candidate, &reference, &DynamicClassSet::default(), DEFAULT_THRESHOLD_SQ);
        assert_eq!(out.x, vec![0.2]);
    }

    #[test]
    fn test_distance_equal_to_threshold_is_matched() {
        let reference = cloud(&[(1.0, 0.0, 0.0, 40)]);
        let candidate = cloud(&[(0.0, 0.0, 0.0, 40)]);

        let out = compute_complement(&candidate, &reference, &DynamicClassSet::default(), 1.0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_empty_candidate_reports_all_static() {
        let reference = random_cloud(200, 7);
        let classes = DynamicClassSet::default();

        let out = compute_complement(&PointCloud::new(), &reference, &classes, 0.03);
        let (static_part, _) = crate::core::labels::split_by_dynamic(&reference, &classes);
        assert_eq!(out, static_part);
    }

    #[test]
    fn test_empty_reference() {
        let candidate = random_cloud(50, 3);
        let out = compute_complement(&candidate, &PointCloud::new(), &DynamicClassSet::default(), 0.03);
        assert!(out.is_empty());
    }

    #[test]
    fn test_dynamic_never_reported() {
        let reference = random_cloud(500, 11);
        let candidate = random_cloud(40, 99);
        let classes = DynamicClassSet::default();

        let out = compute_complement(&candidate, &reference, &classes, 0.0);
        assert!(!out.is_empty());
        assert!(out.labels.iter().all(|&l| classes.is_static_label(l)));
    }

    #[test]
    fn test_kdtree_matches_brute_force() {
        let reference = random_cloud(800, 1);
        let candidate = random_cloud(600, 2);
        let classes = DynamicClassSet::default();

        for t in [0.001, 0.01, 0.03, 0.1] {
            let out = compute_complement(&candidate, &reference, &classes, t);
            assert_eq!(out, brute_force(&candidate, &reference, &classes, t));
        }
    }

    #[test]
    fn test_idempotent() {
        let reference = random_cloud(400, 5);
        let candidate = random_cloud(300, 6);
        let classes = DynamicClassSet::default();

        let a = compute_complement(&candidate, &reference, &classes, 0.03);
        let b = compute_complement(&candidate, &reference, &classes, 0.03);
        assert_eq!(a, b);
    }

    #[test]
    fn test_monotonic_in_threshold() {
        let reference = random_cloud(400, 21);
        let candidate = random_cloud(150, 22);
        let classes = DynamicClassSet::default();

        let mut previous = usize::MAX;
        for t in [0.0, 0.005, 0.01, 0.03, 0.1, 0.5, 2.0] {
            let n = compute_complement(&candidate, &reference, &classes, t).len();
            assert!(n <= previous, "threshold {} grew the complement", t);
            previous = n;
        }
    }

    #[test]
    fn test_neighbor_index_variants() {
        assert!(NeighborIndex::build(&PointCloud::new()).is_empty());
        assert_eq!(
            NeighborIndex::build(&PointCloud::new()).nearest_distance_sq(&[0.0, 0.0, 0.0]),
            f32::INFINITY
        );

        let small = cloud(&[(1.0, 0.0, 0.0, 0), (0.0, 2.0, 0.0, 0)]);
        let index = NeighborIndex::build(&small);
        assert!(matches!(index, NeighborIndex::Linear(_)));
        assert_eq!(index.nearest_distance_sq(&[0.0, 0.0, 0.0]), 1.0);

        let large = random_cloud(100, 4);
        let index = NeighborIndex::build(&large);
        assert!(matches!(index, NeighborIndex::KdTree(_)));
        assert_eq!(index.nearest_distance_sq(&large.point(10).coords()), 0.0);
    }

    #[test]
    fn test_stats_and_evaluate_candidates() {
        let reference = cloud(&[
            (0.0, 0.0, 0.0, 40),
            (5.0, 0.0, 0.0, 40),
            (9.0, 0.0, 0.0, 252),
            (10.0, 0.0, 0.0, 48),
        ]);
        let full = reference.clone();
        let partial = cloud(&[(0.0, 0.0, 0.0, 40)]);
        let classes = DynamicClassSet::default();

        let results = evaluate_candidates(
            &reference,
            [("full", &full), ("partial", &partial)],
            &classes,
            &ComplementConfig::default(),
        );

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].channel, "full/static");
        assert!(results[0].complement.is_empty());
        assert_eq!(results[0].stats.preserved_ratio(), 1.0);

        assert_eq!(results[1].name, "partial");
        assert_eq!(results[1].complement.x, vec![5.0, 10.0]);
        assert_eq!(
            results[1].stats,
            ComplementStats {
                reference_points: 4,
                static_points: 3,
                complement_points: 2,
            }
        );
        assert!((results[1].stats.preserved_ratio() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_reference_points_skipped() {
        let reference = cloud(&[
            (f32::NAN, f32::NAN, f32::NAN, 40),
            (f32::INFINITY, 0.0, 0.0, 40),
            (50.0, 50.0, 50.0, 40),
        ]);
        let classes = DynamicClassSet::default();

        for candidate in [random_cloud(10, 8), random_cloud(100, 9)] {
            let out = compute_complement(&candidate, &reference, &classes, DEFAULT_THRESHOLD_SQ);
            assert_eq!(out.x, vec![50.0]);
        }

        let out = compute_complement(&PointCloud::new(), &reference, &classes, DEFAULT_THRESHOLD_SQ);
        assert_eq!(out.len(), 1);
        assert_eq!(ComplementStats::new(&reference, &classes, &out).static_points, 1);
    }

    #[test]
    fn test_non_finite_candidate_points_not_indexed() {
        let mut candidate = random_cloud(100, 12);
        candidate.push(f32::NAN, 0.0, 0.0, 40);
        let index = NeighborIndex::build(&candidate);
        assert!(index.nearest_distance_sq(&[1.0, 1.0, 1.0]).is_finite());

        let only_nan = cloud(&[(f32::NAN, f32::NAN, f32::NAN, 0)]);
        assert!(NeighborIndex::build(&only_nan).is_empty());
    }

    #[test]
    fn test_preserved_ratio_without_static_points() {
        let reference = cloud(&[(0.0, 0.0, 0.0, 252)]);
        let stats = ComplementStats::new(&reference, &DynamicClassSet::default(), &PointCloud::new());
        assert_eq!(stats.static_points, 0);
        assert_eq!(stats.preserved_ratio(), 1.0);
    }
}
