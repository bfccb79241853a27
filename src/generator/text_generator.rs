//! Single-turn generation and the conversational wrapper around it.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::ollama::{GenerateOptions, OllamaClientTrait};

use super::GeneratorError;
use super::conversation::{ASSISTANT_CUE, Conversation, Turn};
use super::reducer::{PromptReducer, RecentTurnsReducer};
use super::tokens::{HeuristicTokenCounter, TokenCounter};

/// Maximum number of prompt tokens sent to the model.
pub const MAX_INPUT_TOKENS: usize = 1024;

/// Serialized conversations at or above this many tokens are reduced first.
pub const CONTEXT_TOKEN_THRESHOLD: usize = 600;

/// Default token limit for `generate`.
pub const DEFAULT_MAX_NEW_TOKENS: usize = 200;

/// Default token limit for `converse`.
pub const DEFAULT_REPLY_TOKENS: usize = 300;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Control markers such as `<|endoftext|>` or `<|im_end|>`.
static CONTROL_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<\|[^|<>]*\|>").unwrap());

/// Output of one `generate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    prompt: String,
    completion: String,
}

impl Generation {
    /// Returns the prompt as it was sent, after truncation.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Returns only the newly generated text.
    pub fn completion(&self) -> &str {
        &self.completion
    }

    /// Returns the full decoded sequence: prompt followed by completion.
    pub fn text(&self) -> String {
        format!("{}{}", self.prompt, self.completion)
    }
}

/// Builder for constructing `TextGenerator` instances.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use papertrail::generator::TextGeneratorBuilder;
/// use papertrail::ollama::OllamaClientBuilder;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = OllamaClientBuilder::new().build()?;
/// let model = client.model().to_string();
///
/// let generator = TextGeneratorBuilder::new()
///     .client(Arc::new(client))
///     .model(model)
///     .build()?;
///
/// let generation = generator.generate("Once upon a time", 50, 0.7)?;
/// println!("{}", generation.text());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct TextGeneratorBuilder {
    client: Option<Arc<dyn OllamaClientTrait>>,
    model: Option<String>,
    counter: Option<Arc<dyn TokenCounter>>,
    reducer: Option<Arc<dyn PromptReducer>>,
    max_input_tokens: Option<usize>,
    context_threshold: Option<usize>,
}

impl TextGeneratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model client. Required.
    pub fn client(mut self, client: Arc<dyn OllamaClientTrait>) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the model name passed with every request.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the token counter. Defaults to `HeuristicTokenCounter`.
    pub fn token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Sets the reduction policy for long conversations. Defaults to `RecentTurnsReducer`.
    pub fn reducer(mut self, reducer: Arc<dyn PromptReducer>) -> Self {
        self.reducer = Some(reducer);
        self
    }

    /// Overrides `MAX_INPUT_TOKENS`.
    pub fn max_input_tokens(mut self, tokens: usize) -> Self {
        self.max_input_tokens = Some(tokens);
        self
    }

    /// Overrides `CONTEXT_TOKEN_THRESHOLD`.
    pub fn context_threshold(mut self, tokens: usize) -> Self {
        self.context_threshold = Some(tokens);
        self
    }

    /// Builds the `TextGenerator`.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError::Config` if no client was set.
    pub fn build(self) -> Result<TextGenerator, GeneratorError> {
        let client = self
            .client
            .ok_or_else(|| GeneratorError::Config("client must be set via client()".into()))?;

        Ok(TextGenerator {
            client,
            model: self.model.unwrap_or_default(),
            counter: self
                .counter
                .unwrap_or_else(|| Arc::new(HeuristicTokenCounter)),
            reducer: self.reducer.unwrap_or_else(|| Arc::new(RecentTurnsReducer)),
            max_input_tokens: self.max_input_tokens.unwrap_or(MAX_INPUT_TOKENS),
            context_threshold: self.context_threshold.unwrap_or(CONTEXT_TOKEN_THRESHOLD),
        })
    }
}

/// Causal language model wrapper for generation and conversational QA.
///
/// Construct once and share by reference; it holds no per-call state.
pub struct TextGenerator {
    client: Arc<dyn OllamaClientTrait>,
    model: String,
    counter: Arc<dyn TokenCounter>,
    reducer: Arc<dyn PromptReducer>,
    max_input_tokens: usize,
    context_threshold: usize,
}

impl TextGenerator {
    /// Creates a generator with default token counting and reduction.
    #[must_use]
    pub fn new(client: Arc<dyn OllamaClientTrait>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            counter: Arc::new(HeuristicTokenCounter),
            reducer: Arc::new(RecentTurnsReducer),
            max_input_tokens: MAX_INPUT_TOKENS,
            context_threshold: CONTEXT_TOKEN_THRESHOLD,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generates up to `max_new_tokens` tokens continuing `prompt`.
    ///
    /// The prompt is cut to its first `MAX_INPUT_TOKENS` tokens before it is
    /// sent. Control markers are removed from the completion.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError::Model` if the model call fails.
    pub fn generate(
        &self,
        prompt: &str,
        max_new_tokens: usize,
        temperature: f32,
    ) -> Result<Generation, GeneratorError> {
        let prompt = self.counter.truncate_head(prompt, self.max_input_tokens);
        let options = GenerateOptions::new(max_new_tokens, temperature);

        let raw = self.client.generate(&self.model, &prompt, &options)?;
        let completion = strip_control_tokens(&raw);

        Ok(Generation { prompt, completion })
    }

    /// Computes the assistant's next reply without touching the conversation.
    ///
    /// Prompts at or over the context threshold, or over the input limit if
    /// that is lower, are reduced first.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError::Model` if the model call fails.
    pub fn reply(
        &self,
        conversation: &Conversation,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String, GeneratorError> {
        let prompt = conversation.to_prompt();
        let tokens = self.counter.count(&prompt);
        // Anything over the input limit is head-truncated in `generate`,
        // which would cut off the assistant cue.
        let budget = self.context_threshold.min(self.max_input_tokens);

        let prompt = if tokens < budget {
            prompt
        } else {
            debug!(tokens, budget, "conversation exceeds context budget, reducing prompt");
            self.reducer.reduce(conversation, self.counter.as_ref(), budget)
        };

        let generation = self.generate(&prompt, max_tokens, temperature)?;
        Ok(extract_reply(&generation.text()))
    }

    /// Generates the next assistant turn and appends it to `conversation`.
    ///
    /// Exactly one assistant turn is appended per call. On failure that turn
    /// is error-flagged with content `Error: <message>` and the error is also
    /// returned, so callers can either propagate it or just show the turn.
    ///
    /// # Errors
    ///
    /// Returns the `GeneratorError` that produced the error turn.
    pub fn converse(
        &self,
        conversation: &mut Conversation,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<(), GeneratorError> {
        match self.reply(conversation, max_tokens, temperature) {
            Ok(reply) => {
                conversation.push(Turn::assistant(reply));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "generation failed, recording error turn");
                conversation.push(Turn::error(&e));
                Err(e)
            }
        }
    }
}

/// Removes `<|...|>` control markers from decoded model output.
fn strip_control_tokens(text: &str) -> String {
    CONTROL_TOKEN.replace_all(text, "").into_owned()
}

/// Returns the trimmed text after the final assistant cue.
fn extract_reply(text: &str) -> String {
    text.rsplit(ASSISTANT_CUE)
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
