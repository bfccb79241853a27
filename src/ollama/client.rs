/// Ollama HTTP client implementation.
///
/// This module provides `OllamaClient` for making synchronous HTTP requests to the Ollama API,
/// along with error types, sampling options and builder patterns for configuration.
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur when interacting with the Ollama API.
#[derive(Debug, Error)]
pub enum OllamaError {
    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request or response timeout errors
    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// HTTP errors with status code
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Ollama API-specific errors
    #[error("Ollama API error: {message}")]
    Api { message: String },

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl OllamaError {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error)
        } else {
            Self::Network(error)
        }
    }
}

/// Sampling options forwarded to the model with every generate call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateOptions {
    /// Sampling temperature; higher values give more diverse output
    pub temperature: f32,
    /// Upper bound on the number of tokens the model may produce
    pub max_new_tokens: usize,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_new_tokens: 200,
        }
    }
}

impl GenerateOptions {
    /// Creates options with the given token limit and temperature.
    pub fn new(max_new_tokens: usize, temperature: f32) -> Self {
        Self {
            temperature,
            max_new_tokens,
        }
    }
}

/// Builder for constructing `OllamaClient` instances.
///
/// # Examples
///
/// ```
/// use papertrail::ollama::OllamaClientBuilder;
///
/// let client = OllamaClientBuilder::new()
///     .base_url("http://localhost:11434")
///     .build()
///     .expect("Failed to create client");
/// ```
#[derive(Debug, Default)]
pub struct OllamaClientBuilder {
    base_url: Option<String>,
    model: Option<String>,
}

impl OllamaClientBuilder {
    /// Creates a new `OllamaClientBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL for the Ollama API.
    ///
    /// # Arguments
    ///
    /// * `url` - The base URL (e.g., "http://localhost:11434")
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model name for Ollama API calls.
    ///
    /// # Arguments
    ///
    /// * `model` - The model name (e.g., "gpt2" or "llama3.2:3b")
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builds the `OllamaClient` with the configured settings.
    ///
    /// # Environment Variables
    ///
    /// If `base_url()` was not called, this method will check the `OLLAMA_HOST`
    /// environment variable. If not set, it defaults to `http://localhost:11434`.
    ///
    /// If `model()` was not called, this method will check the `OLLAMA_MODEL`
    /// environment variable. If not set, it defaults to an empty string.
    ///
    /// # Errors
    ///
    /// Returns `OllamaError::InvalidUrl` if the base URL does not parse.
    pub fn build(self) -> Result<OllamaClient, OllamaError> {
        let base_url = match self.base_url {
            Some(url) => url,
            None => std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
        };

        let model = match self.model {
            Some(m) => m,
            None => std::env::var("OLLAMA_MODEL").unwrap_or_default(),
        };

        reqwest::Url::parse(&base_url)
            .map_err(|e| OllamaError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(OllamaError::Network)?;

        Ok(OllamaClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

/// Synchronous HTTP client for interacting with the Ollama API.
///
/// It should be constructed using `OllamaClientBuilder`.
pub struct OllamaClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
}

/// Trait for model server operations.
///
/// Everything that talks to a model goes through this trait so unit tests can
/// substitute a mock.
pub trait OllamaClientTrait: Send + Sync {
    /// Generates a completion for `prompt`.
    ///
    /// Returns only the newly generated text, never the prompt itself.
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, OllamaError>;
}

impl OllamaClient {
    /// Returns the base URL configured for this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the model name configured for this client.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Lists available models from the Ollama API, sorted by size (largest first).
    pub fn list_models(&self) -> Result<Vec<String>, OllamaError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(OllamaError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(OllamaError::Http {
                status: response.status().as_u16(),
            });
        }

        let json: serde_json::Value = response.json().map_err(OllamaError::from_reqwest)?;
        Ok(parse_model_list(&json))
    }

    fn generate_internal(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, OllamaError> {
        let url = format!("{}/api/generate", self.base_url);
        let request_body = request_body(model, prompt, options);

        debug!(model, prompt_bytes = prompt.len(), "sending generate request");

        retry_with_backoff(|| {
            let response = self
                .client
                .post(&url)
                .json(&request_body)
                .send()
                .map_err(OllamaError::from_reqwest)?;

            let status = response.status();
            if !status.is_success() {
                return Err(OllamaError::Http {
                    status: status.as_u16(),
                });
            }

            let body = response.text().map_err(OllamaError::from_reqwest)?;
            let json: serde_json::Value =
                serde_json::from_str(&body).map_err(OllamaError::Serialization)?;

            parse_generate_response(&json)
        })
    }
}

impl OllamaClientTrait for OllamaClient {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, OllamaError> {
        self.generate_internal(model, prompt, options)
    }
}

/// Builds the JSON body of a non-streaming `/api/generate` request.
fn request_body(model: &str, prompt: &str, options: &GenerateOptions) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
        "options": {
            "temperature": options.temperature,
            "num_predict": options.max_new_tokens,
        }
    })
}

/// Extracts the generated text from an `/api/generate` response.
fn parse_generate_response(json: &serde_json::Value) -> Result<String, OllamaError> {
    if let Some(message) = json.get("error").and_then(|v| v.as_str()) {
        return Err(OllamaError::Api {
            message: message.to_string(),
        });
    }

    json.get("response")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| OllamaError::Api {
            message: "Missing 'response' field in API response".to_string(),
        })
}

/// Reads model names out of an `/api/tags` response, largest model first.
fn parse_model_list(json: &serde_json::Value) -> Vec<String> {
    let mut models: Vec<(String, u64)> = json
        .get("models")
        .and_then(|m| m.as_array())
        .map(|models| {
            models
                .iter()
                .filter_map(|model| {
                    let name = model.get("name").and_then(|n| n.as_str())?;
                    let size = model.get("size").and_then(|s| s.as_u64()).unwrap_or(0);
                    Some((name.to_string(), size))
                })
                .collect()
        })
        .unwrap_or_default();

    models.sort_by(|a, b| b.1.cmp(&a.1));

    models.into_iter().map(|(name, _)| name).collect()
}

/// Retries an operation with exponential backoff.
///
/// This function will retry the operation up to 3 times with delays of 1s, 2s, and 4s.
/// It only retries on transient errors (HTTP 5xx and network errors), not on client errors (HTTP 4xx).
pub fn retry_with_backoff<F, T>(mut f: F) -> Result<T, OllamaError>
where
    F: FnMut() -> Result<T, OllamaError>,
{
    const MAX_RETRIES: usize = 3;
    const DELAYS: [u64; MAX_RETRIES] = [1, 2, 4]; // seconds

    let mut last_error = match f() {
        Ok(result) => return Ok(result),
        Err(e) => {
            if !should_retry(&e) {
                return Err(e);
            }
            e
        }
    };

    for &delay_secs in &DELAYS {
        warn!(error = %last_error, delay_secs, "transient model server error, retrying");
        thread::sleep(Duration::from_secs(delay_secs));

        match f() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !should_retry(&e) {
                    return Err(e);
                }
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// Determines if an error should be retried.
///
/// Returns `true` for transient errors (HTTP 5xx, network errors, timeouts).
fn should_retry(error: &OllamaError) -> bool {
    match error {
        OllamaError::Network(_) => true,
        OllamaError::Timeout(_) => true,
        OllamaError::Http { status } => (500..600).contains(status),
        OllamaError::Serialization(_) => false,
        OllamaError::Api { .. } => false,
        OllamaError::InvalidUrl(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::error::Error;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn network_error() -> OllamaError {
        OllamaError::Network(
            reqwest::blocking::Client::new()
                .get("not-a-valid-url")
                .build()
                .unwrap_err(),
        )
    }

    #[test]
    fn network_error_variant_creation_and_display() {
        let error_msg = format!("{}", network_error());
        assert!(error_msg.contains("Network error"));
    }

    #[test]
    fn http_error_variant_with_status_code() {
        let ollama_error = OllamaError::Http { status: 404 };

        let error_msg = format!("{}", ollama_error);
        assert!(error_msg.contains("HTTP error"));
        assert!(error_msg.contains("404"));
    }

    #[test]
    fn serialization_error_variant_wraps_serde_errors() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let ollama_error = OllamaError::Serialization(json_error);

        assert!(format!("{}", ollama_error).contains("Serialization error"));
        assert!(ollama_error.source().is_some());
    }

    #[test]
    fn default_options_match_generation_defaults() {
        let options = GenerateOptions::default();
        assert_eq!(options.max_new_tokens, 200);
        assert!((options.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn request_body_carries_sampling_options() {
        let body = request_body("gpt2", "Hello", &GenerateOptions::new(42, 0.3));

        assert_eq!(body["model"], "gpt2");
        assert_eq!(body["prompt"], "Hello");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 42);
        let temperature = body["options"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.3).abs() < 1e-6);
    }

    #[test]
    fn parse_generate_response_reads_response_field() {
        let json = serde_json::json!({ "response": "Generated text here", "done": true });
        assert_eq!(parse_generate_response(&json).unwrap(), "Generated text here");
    }

    #[test]
    fn parse_generate_response_surfaces_api_error() {
        let json = serde_json::json!({ "error": "model 'nope' not found" });
        let err = parse_generate_response(&json).unwrap_err();
        assert!(matches!(err, OllamaError::Api { ref message } if message.contains("not found")));
    }

    #[test]
    fn parse_generate_response_rejects_missing_field() {
        let json = serde_json::json!({ "done": true });
        assert!(matches!(
            parse_generate_response(&json),
            Err(OllamaError::Api { .. })
        ));
    }

    #[test]
    fn parse_model_list_sorts_largest_first() {
        let json = serde_json::json!({
            "models": [
                { "name": "small", "size": 10 },
                { "name": "large", "size": 1000 },
                { "name": "unsized" }
            ]
        });
        assert_eq!(parse_model_list(&json), vec!["large", "small", "unsized"]);
    }

    #[test]
    #[serial]
    fn build_uses_default_url_when_base_url_not_called() {
        unsafe {
            std::env::remove_var("OLLAMA_HOST");
        }

        let client = OllamaClientBuilder::new().build().unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    #[serial]
    fn build_reads_ollama_host_environment_variable_if_set() {
        unsafe {
            std::env::set_var("OLLAMA_HOST", "http://custom-host:11434");
        }

        let client = OllamaClientBuilder::new().build().unwrap();
        assert_eq!(client.base_url(), "http://custom-host:11434");

        unsafe {
            std::env::remove_var("OLLAMA_HOST");
        }
    }

    #[test]
    #[serial]
    fn builder_url_takes_precedence_over_environment() {
        unsafe {
            std::env::set_var("OLLAMA_HOST", "http://env-var-host:11434");
        }

        let client = OllamaClientBuilder::new()
            .base_url("http://builder-host:11434/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://builder-host:11434");

        unsafe {
            std::env::remove_var("OLLAMA_HOST");
        }
    }

    #[test]
    #[serial]
    fn build_reads_ollama_model_environment_variable_if_set() {
        unsafe {
            std::env::set_var("OLLAMA_MODEL", "gpt2");
        }

        let client = OllamaClientBuilder::new().build().unwrap();
        assert_eq!(client.model(), "gpt2");

        unsafe {
            std::env::remove_var("OLLAMA_MODEL");
        }
    }

    #[test]
    #[serial]
    fn build_uses_empty_model_when_ollama_model_not_set() {
        unsafe {
            std::env::remove_var("OLLAMA_MODEL");
        }

        let client = OllamaClientBuilder::new().build().unwrap();
        assert_eq!(client.model(), "");
    }

    #[test]
    fn build_returns_error_if_invalid_url_provided() {
        let result = OllamaClientBuilder::new()
            .base_url("not-a-valid-url")
            .build();
        assert!(matches!(result, Err(OllamaError::InvalidUrl(_))));
    }

    #[test]
    fn retry_succeeds_after_transient_network_error() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let result: Result<&str, OllamaError> = retry_with_backoff(move || {
            let count = attempts_clone.fetch_add(1, Ordering::SeqCst);
            if count < 1 {
                Err(network_error())
            } else {
                Ok("success")
            }
        });

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn retry_does_not_occur_on_http_4xx_errors() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let result: Result<&str, OllamaError> = retry_with_backoff(move || {
            attempts_clone.fetch_add(1, Ordering::SeqCst);
            Err(OllamaError::Http { status: 404 })
        });

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_does_not_occur_on_api_errors() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let result: Result<&str, OllamaError> = retry_with_backoff(move || {
            attempts_clone.fetch_add(1, Ordering::SeqCst);
            Err(OllamaError::Api {
                message: "model not found".to_string(),
            })
        });

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_occurs_on_http_5xx_errors() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let result: Result<&str, OllamaError> = retry_with_backoff(move || {
            let count = attempts_clone.fetch_add(1, Ordering::SeqCst);
            if count < 1 {
                Err(OllamaError::Http { status: 500 })
            } else {
                Ok("success")
            }
        });

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn trait_can_be_implemented_by_mock_struct() {
        struct MockClient {
            response: String,
        }

        impl OllamaClientTrait for MockClient {
            fn generate(
                &self,
                _model: &str,
                _prompt: &str,
                _options: &GenerateOptions,
            ) -> Result<String, OllamaError> {
                Ok(self.response.clone())
            }
        }

        let mock = MockClient {
            response: "test response".to_string(),
        };
        let client: &dyn OllamaClientTrait = &mock;
        let result = client.generate("test-model", "test prompt", &GenerateOptions::default());
        assert_eq!(result.unwrap(), "test response");
    }
}
