//! Zero-shot classifier backed by an instruction-following model.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::ollama::{GenerateOptions, OllamaClientTrait};

use super::ClassifierError;
use super::types::Classification;

/// Fixed head of the label-scoring prompt.
///
/// The model scores every candidate label and the top one is picked locally.
/// `build_prompt` appends the label list and the text.
const PROMPT_PREAMBLE: &str = r#"Classify the text below against the candidate labels. Return ONLY a JSON object with every candidate label as a key and a score from 0.0 to 1.0 as its value. Higher scores mean the label describes the text better. Do not include any explanatory text.

EXAMPLE:

Labels: sports, politics, cooking
Text: "The striker scored twice in the final minutes of the match."
Output: {"sports": 0.95, "politics": 0.02, "cooking": 0.03}

CANDIDATE LABELS:
"#;

/// Scoring requests are deterministic and short.
const SCORING_OPTIONS: GenerateOptions = GenerateOptions {
    temperature: 0.0,
    max_new_tokens: 256,
};

/// Builder for constructing `ZeroShotClassifier` instances.
#[derive(Default)]
pub struct ZeroShotClassifierBuilder {
    client: Option<Arc<dyn OllamaClientTrait>>,
    model: Option<String>,
}

impl ZeroShotClassifierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model client. Required.
    pub fn client(mut self, client: Arc<dyn OllamaClientTrait>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builds the classifier.
    ///
    /// # Errors
    ///
    /// Returns `ClassifierError::Config` if no client was set.
    pub fn build(self) -> Result<ZeroShotClassifier, ClassifierError> {
        let client = self
            .client
            .ok_or_else(|| ClassifierError::Config("client must be set via client()".into()))?;

        Ok(ZeroShotClassifier {
            client,
            model: self.model.unwrap_or_default(),
        })
    }
}

/// Maps texts to the best-scoring label among arbitrary candidates.
///
/// ```no_run
/// use std::sync::Arc;
/// use papertrail::classifier::ZeroShotClassifier;
/// use papertrail::ollama::OllamaClientBuilder;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = OllamaClientBuilder::new().build()?;
/// let model = client.model().to_string();
/// let classifier = ZeroShotClassifier::new(Arc::new(client), model);
///
/// let labels = classifier.classify_labels(
///     &["The GPU kernel ran out of memory"],
///     &["hardware", "cooking"],
/// );
/// println!("{labels:?}");
/// # Ok(())
/// # }
/// ```
pub struct ZeroShotClassifier {
    client: Arc<dyn OllamaClientTrait>,
    model: String,
}

impl ZeroShotClassifier {
    #[must_use]
    pub fn new(client: Arc<dyn OllamaClientTrait>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Scores one text against `candidate_labels` and picks the top label.
    ///
    /// # Errors
    ///
    /// - `NoCandidates` if `candidate_labels` is empty
    /// - `Model` if the model call fails
    /// - `MalformedResponse` if the response holds no JSON object
    /// - `NoScores` if none of the candidate labels got a numeric score
    pub fn classify_one(
        &self,
        text: &str,
        candidate_labels: &[&str],
    ) -> Result<Classification, ClassifierError> {
        if candidate_labels.is_empty() {
            return Err(ClassifierError::NoCandidates);
        }

        let prompt = build_prompt(text, candidate_labels);
        let response = self.client.generate(&self.model, &prompt, &SCORING_OPTIONS)?;

        let json_str = extract_json(&response).ok_or_else(|| {
            ClassifierError::MalformedResponse("no JSON object in model output".to_string())
        })?;

        let scores = parse_scores(&json_str, candidate_labels)?;
        debug!(labels = candidate_labels.len(), scored = scores.len(), "scored text");

        Classification::from_scores(scores).ok_or(ClassifierError::NoScores)
    }

    /// Classifies each text independently.
    ///
    /// The output has one entry per input, in input order. A failure for one
    /// text never affects the others.
    pub fn classify<T, L>(
        &self,
        texts: &[T],
        candidate_labels: &[L],
    ) -> Vec<Result<Classification, ClassifierError>>
    where
        T: AsRef<str>,
        L: AsRef<str>,
    {
        let labels: Vec<&str> = candidate_labels.iter().map(AsRef::as_ref).collect();

        texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let result = self.classify_one(text.as_ref(), &labels);
                if let Err(e) = &result {
                    warn!(index, error = %e, "classification failed");
                }
                result
            })
            .collect()
    }

    /// Like `classify`, but returns plain strings: the top label, or
    /// `Error: <message>` in place of a failed item.
    pub fn classify_labels<T, L>(&self, texts: &[T], candidate_labels: &[L]) -> Vec<String>
    where
        T: AsRef<str>,
        L: AsRef<str>,
    {
        self.classify(texts, candidate_labels)
            .into_iter()
            .map(|result| match result {
                Ok(classification) => classification.label().to_string(),
                Err(e) => format!("Error: {e}"),
            })
            .collect()
    }
}

fn build_prompt(text: &str, candidate_labels: &[&str]) -> String {
    let labels = candidate_labels
        .iter()
        .map(|label| format!("- {label}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{PROMPT_PREAMBLE}{labels}\n\nTEXT:\n{text}\n\nJSON OUTPUT:")
}

/// Extracts the outermost JSON object from model output.
///
/// Handles markdown code fences and explanatory text around the object.
fn extract_json(response: &str) -> Option<String> {
    let trimmed = response.trim();

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;

    if start <= end {
        Some(trimmed[start..=end].to_string())
    } else {
        None
    }
}

/// Reads candidate label scores out of a JSON object.
///
/// Keys are matched to candidates case-insensitively and reported with the
/// candidate's spelling. Non-candidate keys and non-numeric values are
/// ignored. Scores are clamped to 0.0-1.0. The result follows candidate order.
fn parse_scores(
    json_str: &str,
    candidate_labels: &[&str],
) -> Result<Vec<(String, f64)>, ClassifierError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| ClassifierError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let obj = json_value.as_object().ok_or_else(|| {
        ClassifierError::MalformedResponse("expected a JSON object".to_string())
    })?;

    let normalized: Vec<String> = candidate_labels
        .iter()
        .map(|label| label.trim().to_lowercase())
        .collect();
    let mut best: Vec<Option<f64>> = vec![None; candidate_labels.len()];

    for (key, value) in obj {
        let Some(score) = value.as_f64() else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let Some(index) = normalized.iter().position(|label| *label == key) else {
            continue;
        };

        let score = score.clamp(0.0, 1.0);
        best[index] = Some(best[index].map_or(score, |current| current.max(score)));
    }

    Ok(candidate_labels
        .iter()
        .zip(best)
        .filter_map(|(label, score)| score.map(|s| (label.to_string(), s)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ollama::OllamaError;

    struct MockOllamaClient {
        response: String,
    }

    impl OllamaClientTrait for MockOllamaClient {
        fn generate(
            &self,
            _model: &str,
            _prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<String, OllamaError> {
            Ok(self.response.clone())
        }
    }

    fn classifier(response: &str) -> ZeroShotClassifier {
        ZeroShotClassifier::new(
            Arc::new(MockOllamaClient {
                response: response.to_string(),
            }),
            "test-model",
        )
    }

    #[test]
    fn builder_requires_client() {
        let result = ZeroShotClassifierBuilder::new().model("m").build();
        assert!(matches!(result, Err(ClassifierError::Config(_))));
    }

    #[test]
    fn prompt_lists_labels_and_text() {
        let prompt = build_prompt("Some text", &["alpha", "beta"]);
        assert!(prompt.contains("- alpha\n- beta"));
        assert!(prompt.contains("TEXT:\nSome text"));
        assert!(prompt.ends_with("Some text\n\nJSON OUTPUT:"));
    }

    #[test]
    fn placeholder_like_labels_are_inserted_verbatim() {
        let prompt = build_prompt("the input", &["{text}", "{labels}"]);

        assert!(prompt.contains("- {text}\n- {labels}\n\nTEXT:\nthe input"));
        assert_eq!(prompt.matches("the input").count(), 1);
    }

    #[test]
    fn picks_highest_scoring_label() {
        let classifier = classifier(r#"{"sports": 0.1, "science": 0.8, "art": 0.1}"#);

        let result = classifier
            .classify_one("Mitochondria produce ATP.", &["sports", "science", "art"])
            .unwrap();

        assert_eq!(result.label(), "science");
        assert!((result.score() - 0.8).abs() < 1e-9);
        assert_eq!(result.scores()[0].0, "science");
    }

    #[test]
    fn labels_match_case_insensitively_and_keep_candidate_spelling() {
        let classifier = classifier(r#"{"MACHINE LEARNING": 0.9, "Biology": 0.2}"#);

        let result = classifier
            .classify_one("Transformers and attention", &["Machine Learning", "biology"])
            .unwrap();

        assert_eq!(result.label(), "Machine Learning");
    }

    #[test]
    fn ignores_labels_outside_the_candidate_set() {
        let classifier = classifier(r#"{"physics": 0.99, "chemistry": 0.4}"#);

        let result = classifier
            .classify_one("Reaction kinetics", &["chemistry", "biology"])
            .unwrap();

        assert_eq!(result.label(), "chemistry");
        assert_eq!(result.scores().len(), 1);
    }

    #[test]
    fn ties_resolve_to_first_candidate() {
        let classifier = classifier(r#"{"b": 0.5, "a": 0.5}"#);
        let result = classifier.classify_one("x", &["a", "b"]).unwrap();
        assert_eq!(result.label(), "a");
    }

    #[test]
    fn scores_are_clamped() {
        let scores = parse_scores(r#"{"a": 3.0, "b": -1.0}"#, &["a", "b"]).unwrap();
        assert_eq!(scores, vec![("a".to_string(), 1.0), ("b".to_string(), 0.0)]);
    }

    #[test]
    fn extracts_json_from_markdown_fence() {
        let classifier = classifier("Sure!\n```json\n{\"cats\": 0.7, \"dogs\": 0.3}\n```\n");
        let result = classifier.classify_one("meow", &["cats", "dogs"]).unwrap();
        assert_eq!(result.label(), "cats");
    }

    #[test]
    fn empty_candidates_is_an_error() {
        let classifier = classifier(r#"{"a": 1.0}"#);
        let result = classifier.classify_one("x", &[]);
        assert!(matches!(result, Err(ClassifierError::NoCandidates)));
    }

    #[test]
    fn response_without_json_is_malformed() {
        let classifier = classifier("I think it is about sports.");
        let result = classifier.classify_one("x", &["sports"]);
        assert!(matches!(result, Err(ClassifierError::MalformedResponse(_))));
    }

    #[test]
    fn response_without_candidate_scores_has_no_scores() {
        let classifier = classifier(r#"{"other": 0.9, "sports": "high"}"#);
        let result = classifier.classify_one("x", &["sports"]);
        assert!(matches!(result, Err(ClassifierError::NoScores)));
    }

    #[test]
    fn classify_labels_returns_one_entry_per_text() {
        let classifier = classifier(r#"{"pos": 0.9, "neg": 0.1}"#);
        let labels = ["pos", "neg"];

        let result = classifier.classify_labels(&["a", "b"], &labels);

        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|label| labels.contains(&label.as_str())));
    }
}
