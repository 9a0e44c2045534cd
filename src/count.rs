//! Count extraction.
//!
//! Reduces a `DetectionSet` to a scalar count with a class + confidence
//! predicate. `count` and `filter` share one predicate, so the number published
//! always equals the number of boxes a renderer would draw.

use crate::cell::Count;
use crate::detect::{Detection, DetectionSet, ObjectClass};

/// Count the detections satisfying `predicate`.
pub fn count_matching<P>(set: &DetectionSet, predicate: P) -> Count
where
    P: Fn(&Detection) -> bool,
{
    let n = set.iter().filter(|d| predicate(d)).count();
    Count::try_from(n).unwrap_or(Count::MAX)
}

/// Subset of `set` satisfying `predicate`, original order preserved.
pub fn filter_matching<P>(set: &DetectionSet, predicate: P) -> DetectionSet
where
    P: Fn(&Detection) -> bool,
{
    set.iter().filter(|d| predicate(d)).cloned().collect()
}

/// Class + confidence predicate used by the detection loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CountPolicy {
    pub label: ObjectClass,
    /// Detections must score strictly above this value.
    pub min_confidence: f32,
}

impl CountPolicy {
    pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.35;

    pub fn new(label: ObjectClass, min_confidence: f32) -> Self {
        Self {
            label,
            min_confidence,
        }
    }

    /// People scoring above 0.35.
    pub fn people() -> Self {
        Self::new(ObjectClass::Person, Self::DEFAULT_MIN_CONFIDENCE)
    }

    pub fn matches(&self, detection: &Detection) -> bool {
        detection.class == self.label && detection.confidence > self.min_confidence
    }

    pub fn count(&self, set: &DetectionSet) -> Count {
        count_matching(set, |d| self.matches(d))
    }

    pub fn filter(&self, set: &DetectionSet) -> DetectionSet {
        filter_matching(set, |d| self.matches(d))
    }

    /// Filter once and report the size of the result.
    pub fn filter_and_count(&self, set: &DetectionSet) -> (DetectionSet, Count) {
        let filtered = self.filter(set);
        let count = Count::try_from(filtered.len()).unwrap_or(Count::MAX);
        (filtered, count)
    }
}

impl Default for CountPolicy {
    fn default() -> Self {
        Self::people()
    }
}
