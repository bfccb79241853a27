//! Types for classification results.

use serde::Serialize;

/// Outcome of classifying one text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    /// The top-scoring candidate label
    label: String,
    /// Every scored candidate, highest first
    scores: Vec<(String, f64)>,
}

impl Classification {
    /// Builds a classification from candidate scores listed in candidate order.
    ///
    /// Returns `None` when `scores` is empty. Equal scores keep candidate
    /// order, so ties resolve to the earlier candidate.
    pub fn from_scores(mut scores: Vec<(String, f64)>) -> Option<Self> {
        scores.sort_by(|a, b| b.1.total_cmp(&a.1));
        let label = scores.first()?.0.clone();
        Some(Self { label, scores })
    }

    /// Returns the top-scoring label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the top label's score.
    pub fn score(&self) -> f64 {
        self.scores.first().map_or(0.0, |(_, score)| *score)
    }

    /// Returns all scored labels, highest first.
    pub fn scores(&self) -> &[(String, f64)] {
        &self.scores
    }
}
