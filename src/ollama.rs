/// Ollama HTTP client module.
///
/// This module provides a blocking HTTP client for an Ollama-compatible model server,
/// including error handling, retry logic, and timeout configuration.
mod client;

pub use client::{
    GenerateOptions, OllamaClient, OllamaClientBuilder, OllamaClientTrait, OllamaError,
    retry_with_backoff,
};
