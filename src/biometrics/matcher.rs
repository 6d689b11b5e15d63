use serde::Serialize;

use crate::model::embedding::Embedding;

/// Distance at or below which two embeddings are treated as the same person.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;

/// Outcome of comparing a live embedding against an enrolled one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verification {
    pub is_match: bool,
    /// Euclidean distance; absent when either side was missing.
    pub distance: Option<f64>,
}

impl Verification {
    fn no_input() -> Self {
        Self {
            is_match: false,
            distance: None,
        }
    }
}

/// Threshold decision over embedding distances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
    threshold: f64,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compare a live embedding with an enrolled one.
    ///
    /// Both embeddings must come from the same extractor, so their lengths
    /// always agree.
    pub fn verify(&self, live: Option<&Embedding>, enrolled: Option<&Embedding>) -> Verification {
        match (live, enrolled) {
            (Some(live), Some(enrolled)) => {
                let distance = euclidean_distance(live.as_slice(), enrolled.as_slice());
                Verification {
                    is_match: self.accepts(distance),
                    distance: Some(distance),
                }
            }
            _ => Verification::no_input(),
        }
    }

    /// Inclusive: a distance equal to the threshold is a match.
    pub fn accepts(&self, distance: f64) -> bool {
        distance <= self.threshold
    }
}

/// # Panics
///
/// If the slices differ in length.
pub fn euclidean_distance(lhs: &[f64], rhs: &[f64]) -> f64 {
    assert_eq!(
        lhs.len(),
        rhs.len(),
        "embeddings from different extractors cannot be compared"
    );
    lhs.iter()
        .zip(rhs)
        .map(|(l, r)| (l - r).powi(2))
        .sum::<f64>()
        .sqrt()
}
