//! Semantic label decoding and dynamic/static classification.
//!
//! Labeled maps store one packed 32-bit value per point:
//! - Low 16 bits: semantic class id (e.g. car, pedestrian, road)
//! - High 16 bits: instance id (carried through, not used for classification)
//!
//! Input files usually carry this value in a float `intensity` channel, so
//! [`intensity_to_label`] is the entry point for loaders.

use std::collections::BTreeSet;

use super::loaders::PointCloud;

/// Semantic class ids of SemanticKITTI moving objects
/// (moving-car, moving-bicyclist, moving-person, moving-motorcyclist,
/// moving-on-rails, moving-bus, moving-truck, moving-other-vehicle).
pub const DEFAULT_DYNAMIC_CLASSES: [u32; 8] = [252, 253, 254, 255, 256, 257, 258, 259];

const SEMANTIC_MASK: u32 = 0xFFFF;
const INSTANCE_SHIFT: u32 = 16;

/// A decoded packed label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemanticLabel {
    pub semantic_class: u32,
    pub instance_id: u32,
}

impl SemanticLabel {
    /// Split a packed label into semantic class and instance id.
    #[inline]
    pub fn decode(packed: u32) -> Self {
        Self {
            semantic_class: packed & SEMANTIC_MASK,
            instance_id: packed >> INSTANCE_SHIFT,
        }
    }

    /// Pack back into a single value. Bits above 16 in either field are dropped.
    #[inline]
    pub fn pack(&self) -> u32 {
        ((self.instance_id & SEMANTIC_MASK) << INSTANCE_SHIFT) | (self.semantic_class & SEMANTIC_MASK)
    }
}

/// Convert a float intensity channel value into a packed label.
///
/// Truncates toward zero. Negative and NaN values map to 0 and values above
/// `u32::MAX` saturate, so every input yields a label. Takes `f64` so that
/// ASCII files holding large integer labels are not rounded through `f32`.
#[inline]
pub fn intensity_to_label(intensity: f64) -> u32 {
    intensity as u32
}

/// Immutable set of semantic classes that are treated as moving objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicClassSet {
    classes: BTreeSet<u32>,
}

impl DynamicClassSet {
    pub fn new<I: IntoIterator<Item = u32>>(classes: I) -> Self {
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    /// A set with no dynamic classes; every point is static.
    pub fn empty() -> Self {
        Self {
            classes: BTreeSet::new(),
        }
    }

    #[inline]
    pub fn is_dynamic(&self, semantic_class: u32) -> bool {
        self.classes.contains(&semantic_class)
    }

    /// Decode `packed` and test its semantic class.
    #[inline]
    pub fn is_dynamic_label(&self, packed: u32) -> bool {
        self.is_dynamic(SemanticLabel::decode(packed).semantic_class)
    }

    #[inline]
    pub fn is_static_label(&self, packed: u32) -> bool {
        !self.is_dynamic_label(packed)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.classes.iter().copied()
    }
}

impl Default for DynamicClassSet {
    fn default() -> Self {
        Self::new(DEFAULT_DYNAMIC_CLASSES)
    }
}

/// Split a cloud into `(static, dynamic)` parts, preserving point order.
pub fn split_by_dynamic(cloud: &PointCloud, classes: &DynamicClassSet) -> (PointCloud, PointCloud) {
    let mut static_part = PointCloud::with_capacity(cloud.len());
    let mut dynamic_part = PointCloud::new();

    for point in cloud.iter() {
        if classes.is_dynamic_label(point.label) {
            dynamic_part.push_point(point);
        } else {
            static_part.push_point(point);
        }
    }

    (static_part, dynamic_part)
}

/// Count points per semantic class, sorted by class id.
pub fn class_histogram(cloud: &PointCloud) -> Vec<(u32, usize)> {
    let mut counts = std::collections::BTreeMap::new();
    for &label in &cloud.labels {
        *counts.entry(SemanticLabel::decode(label).semantic_class).or_insert(0usize) += 1;
    }
    counts.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_splits_bits() {
        let packed = (7u32 << 16) | 252;
        let label = SemanticLabel::decode(packed);
        assert_eq!(label.semantic_class, 252);
        assert_eq!(label.instance_id, 7);

        for v in [0u32, 1, 0xFFFF, 0x1_0000, 0xDEAD_BEEF, u32::MAX] {
            let label = SemanticLabel::decode(v);
            assert_eq!(label.semantic_class, v & 0xFFFF);
            assert_eq!(label.instance_id, v >> 16);
            assert_eq!(label.pack(), v);
        }
    }

    #[test]
    fn test_default_dynamic_classes() {
        let classes = DynamicClassSet::default();
        assert_eq!(classes.len(), 8);
        for c in 252..=259 {
            assert!(classes.is_dynamic(c));
        }
        assert!(!classes.is_dynamic(251));
        assert!(!classes.is_dynamic(260));
        assert!(!classes.is_dynamic(0));
    }

    #[test]
    fn test_instance_id_ignored_for_classification() {
        let classes = DynamicClassSet::default();
        assert!(classes.is_dynamic_label((42 << 16) | 253));
        assert!(classes.is_static_label((253 << 16) | 40));
    }

    #[test]
    fn test_empty_set_is_all_static() {
        let classes = DynamicClassSet::empty();
        assert!(classes.is_empty());
        assert!(classes.is_static_label(252));
    }

    #[test]
    fn test_iter_ascending() {
        let classes = DynamicClassSet::new([259, 252, 255, 252]);
        assert_eq!(classes.iter().collect::<Vec<_>>(), vec![252, 255, 259]);
        assert_eq!(
            DynamicClassSet::default().iter().collect::<Vec<_>>(),
            DEFAULT_DYNAMIC_CLASSES.to_vec()
        );
    }

    #[test]
    fn test_intensity_to_label() {
        assert_eq!(intensity_to_label(252.0), 252);
        assert_eq!(intensity_to_label(252.9), 252);
        assert_eq!(intensity_to_label(-3.0), 0);
        assert_eq!(intensity_to_label(f64::NAN), 0);
        assert_eq!(intensity_to_label(65_536.0 + 40.0), (1 << 16) | 40);
        assert_eq!(intensity_to_label(4_294_967_295.0), u32::MAX);
        assert_eq!(intensity_to_label(1e12), u32::MAX);
    }

    #[test]
    fn test_split_by_dynamic_preserves_order() {
        let mut cloud = PointCloud::new();
        cloud.push(0.0, 0.0, 0.0, 40);
        cloud.push(1.0, 0.0, 0.0, 252);
        cloud.push(2.0, 0.0, 0.0, 48);
        cloud.push(3.0, 0.0, 0.0, (3 << 16) | 259);

        let (static_part, dynamic_part) = split_by_dynamic(&cloud, &DynamicClassSet::default());
        assert_eq!(static_part.x, vec![0.0, 2.0]);
        assert_eq!(dynamic_part.x, vec![1.0, 3.0]);
        assert_eq!(dynamic_part.labels[1], (3 << 16) | 259);
    }

    #[test]
    fn test_class_histogram() {
        let mut cloud = PointCloud::new();
        cloud.push(0.0, 0.0, 0.0, 40);
        cloud.push(0.0, 0.0, 0.0, (1 << 16) | 40);
        cloud.push(0.0, 0.0, 0.0, 252);

        assert_eq!(class_histogram(&cloud), vec![(40, 2), (252, 1)]);
    }
}
