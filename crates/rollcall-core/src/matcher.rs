//! Signature comparison under a fixed Euclidean distance threshold.

use crate::types::Signature;

/// Conventional cutoff for 128-d ResNet face signatures.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// True when `candidate` lies within `threshold` of `reference` (inclusive).
pub fn is_match(reference: &Signature, candidate: &Signature, threshold: f32) -> bool {
    reference.distance(candidate) <= threshold
}

/// Nearest candidate found by [`Matcher::closest`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Closest {
    pub index: usize,
    pub distance: f32,
}

/// Strategy for deciding whether a reference signature appears among candidates.
pub trait Matcher {
    fn is_match(&self, reference: &Signature, candidate: &Signature) -> bool;

    /// True iff at least one candidate matches. Stops at the first hit.
    fn any_match(&self, reference: &Signature, candidates: &[Signature]) -> bool {
        candidates.iter().any(|c| self.is_match(reference, c))
    }
}

/// Euclidean matcher with an injected threshold.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Nearest candidate regardless of threshold, `None` for an empty set.
    pub fn closest(&self, reference: &Signature, candidates: &[Signature]) -> Option<Closest> {
        candidates
            .iter()
            .enumerate()
            .map(|(index, c)| Closest { index, distance: reference.distance(c) })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn is_match(&self, reference: &Signature, candidate: &Signature) -> bool {
        is_match(reference, candidate, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SIGNATURE_DIM;

    fn sig_with(axis: usize, value: f32) -> Signature {
        let mut values = vec![0.0; SIGNATURE_DIM];
        values[axis] = value;
        Signature::new(values).unwrap()
    }

    #[test]
    fn test_match_at_threshold_is_inclusive() {
        let reference = sig_with(0, 0.0);
        let candidate = sig_with(0, 0.5);
        assert!(is_match(&reference, &candidate, 0.5));
        assert!(!is_match(&reference, &candidate, 0.49));
    }

    #[test]
    fn test_default_threshold() {
        let matcher = EuclideanMatcher::default();
        assert_eq!(matcher.threshold(), DEFAULT_MATCH_THRESHOLD);
        assert!(matcher.is_match(&sig_with(1, 1.0), &sig_with(1, 1.55)));
        assert!(!matcher.is_match(&sig_with(1, 1.0), &sig_with(1, 1.65)));
    }

    #[test]
    fn test_any_match_empty_candidates() {
        let matcher = EuclideanMatcher::default();
        assert!(!matcher.any_match(&sig_with(0, 1.0), &[]));
    }

    #[test]
    fn test_any_match_order_independent() {
        let matcher = EuclideanMatcher::default();
        let reference = sig_with(2, 1.0);
        let mut candidates = vec![sig_with(0, 1.0), sig_with(1, 1.0), sig_with(2, 0.9)];
        assert!(matcher.any_match(&reference, &candidates));
        candidates.reverse();
        assert!(matcher.any_match(&reference, &candidates));
    }

    #[test]
    fn test_any_match_none_within_threshold() {
        let matcher = EuclideanMatcher::default();
        let candidates = vec![sig_with(0, 1.0), sig_with(1, 1.0)];
        assert!(!matcher.any_match(&sig_with(2, 1.0), &candidates));
    }

    #[test]
    fn test_closest_reports_distance() {
        let matcher = EuclideanMatcher::default();
        let candidates = vec![sig_with(0, 1.0), sig_with(3, 0.75), sig_with(3, 3.0)];
        let closest = matcher.closest(&sig_with(3, 1.0), &candidates).unwrap();
        assert_eq!(closest.index, 1);
        assert!((closest.distance - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_closest_empty() {
        assert_eq!(EuclideanMatcher::default().closest(&sig_with(0, 1.0), &[]), None);
    }
}
