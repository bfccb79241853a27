//! Text generation and conversational question answering.
//!
//! `TextGenerator` wraps a causal language model served by an Ollama-compatible
//! server. Prompts are cut to `MAX_INPUT_TOKENS`; conversations whose serialized
//! transcript reaches `CONTEXT_TOKEN_THRESHOLD` tokens are shrunk by a
//! `PromptReducer` before generation.
//!
//! ```no_run
//! use std::sync::Arc;
//! use papertrail::generator::{Conversation, TextGenerator, Turn};
//! use papertrail::ollama::OllamaClientBuilder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClientBuilder::new().build()?;
//! let model = client.model().to_string();
//! let generator = TextGenerator::new(Arc::new(client), model);
//!
//! let mut conversation = Conversation::from(vec![Turn::user("What is a DOI?")]);
//! // The reply (or an error-flagged turn) is appended either way.
//! let _ = generator.converse(&mut conversation, 300, 0.7);
//! println!("{}", conversation.last().map(|t| t.content.as_str()).unwrap_or(""));
//! # Ok(())
//! # }
//! ```

mod conversation;
mod reducer;
mod text_generator;
mod tokens;

use thiserror::Error;

use crate::ollama::OllamaError;

pub use conversation::{ASSISTANT_CUE, ASSISTANT_ROLE, Conversation, Turn, USER_ROLE};
pub use reducer::{PromptReducer, RecentTurnsReducer};
pub use text_generator::{
    CONTEXT_TOKEN_THRESHOLD, DEFAULT_MAX_NEW_TOKENS, DEFAULT_REPLY_TOKENS, DEFAULT_TEMPERATURE,
    Generation, MAX_INPUT_TOKENS, TextGenerator, TextGeneratorBuilder,
};
pub use tokens::{HeuristicTokenCounter, HfTokenCounter, TokenCounter};

/// Errors produced while generating text.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The model server call failed
    #[error(transparent)]
    Model(#[from] OllamaError),

    /// The tokenizer could not be loaded
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// The generator was built with missing or invalid settings
    #[error("Invalid configuration: {0}")]
    Config(String),
}
