//! Engine configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::LlmError;

/// Default chat model.
const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default max tokens for the streamed answer.
const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Default retries for transport errors when opening a stream.
const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default base delay between retries (doubled each attempt).
const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;
/// Default cap on router → tool → completion cycles per turn.
const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;
/// Token cap for the deterministic pipeline calls (select, grade, rephrase).
const DEFAULT_UTILITY_MAX_TOKENS: u32 = 256;

/// Configuration for the chat engine and its provider.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model used when a turn does not name one.
    pub default_model: String,
    /// Maximum tokens for the streamed answer.
    pub max_tokens: u32,
    /// Maximum tokens for rephrase, table selection and grading calls.
    pub utility_max_tokens: u32,
    /// Retries for transport errors when opening a completion stream.
    pub max_retries: u32,
    /// Base backoff between retries.
    pub retry_backoff: Duration,
    /// Maximum completion cycles per turn before aborting.
    pub max_tool_iterations: usize,
    /// Directory containing prompt template files.
    ///
    /// When set, prompts are loaded from markdown files in this directory,
    /// falling back to compiled-in defaults for any missing files.
    pub prompt_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Creates a new builder for `EngineConfig`.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    default_model: Option<String>,
    max_tokens: Option<u32>,
    utility_max_tokens: Option<u32>,
    max_retries: Option<u32>,
    retry_backoff: Option<Duration>,
    max_tool_iterations: Option<usize>,
    prompt_dir: Option<PathBuf>,
}

impl EngineConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("GROUNDWIRE_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("GROUNDWIRE_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("GROUNDWIRE_BASE_URL"))
                .ok();
        }
        if self.default_model.is_none() {
            self.default_model = std::env::var("GROUNDWIRE_MODEL").ok();
        }
        if self.max_retries.is_none() {
            self.max_retries = std::env::var("GROUNDWIRE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.max_tool_iterations.is_none() {
            self.max_tool_iterations = std::env::var("GROUNDWIRE_MAX_TOOL_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("GROUNDWIRE_PROMPT_DIR")
                .ok()
                .map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the default chat model.
    #[must_use]
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Sets the answer max tokens.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the max tokens for pipeline utility calls.
    #[must_use]
    pub const fn utility_max_tokens(mut self, n: u32) -> Self {
        self.utility_max_tokens = Some(n);
        self
    }

    /// Sets the max retries.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the base retry backoff.
    #[must_use]
    pub const fn retry_backoff(mut self, delay: Duration) -> Self {
        self.retry_backoff = Some(delay);
        self
    }

    /// Sets the maximum completion cycles per turn.
    #[must_use]
    pub const fn max_tool_iterations(mut self, n: usize) -> Self {
        self.max_tool_iterations = Some(n);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`EngineConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<EngineConfig, LlmError> {
        let api_key = self.api_key.ok_or(LlmError::ApiKeyMissing)?;

        Ok(EngineConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            default_model: self
                .default_model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            utility_max_tokens: self
                .utility_max_tokens
                .unwrap_or(DEFAULT_UTILITY_MAX_TOKENS),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_backoff: self
                .retry_backoff
                .unwrap_or(Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS)),
            max_tool_iterations: self
                .max_tool_iterations
                .unwrap_or(DEFAULT_MAX_TOOL_ITERATIONS),
            prompt_dir: self.prompt_dir,
        })
    }
}
