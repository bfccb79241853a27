//! Zero-shot text classification.
//!
//! `ZeroShotClassifier` asks a model to score each text against a set of
//! candidate labels supplied at call time and keeps the best one. Texts are
//! classified one at a time and independently: a failed item yields an error
//! value in its slot while the rest of the batch still completes.

mod types;
mod zero_shot;

use thiserror::Error;

use crate::ollama::OllamaError;

pub use types::Classification;
pub use zero_shot::{ZeroShotClassifier, ZeroShotClassifierBuilder};

/// Errors produced while classifying a single text.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The model server call failed
    #[error(transparent)]
    Model(#[from] OllamaError),

    /// No candidate labels were supplied
    #[error("No candidate labels supplied")]
    NoCandidates,

    /// The model output could not be read as label scores
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// The model output scored none of the candidate labels
    #[error("Model response scored none of the candidate labels")]
    NoScores,

    /// The classifier was built with missing or invalid settings
    #[error("Invalid configuration: {0}")]
    Config(String),
}
