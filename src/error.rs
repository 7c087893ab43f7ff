//! Error types for groundwire.
//!
//! Each layer has its own `thiserror` enum. The chat engine never lets
//! these escape a turn: they are turned into fallback values or labeled
//! assistant messages at the stage that caught them.

use thiserror::Error;

/// Errors from a language-model provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key was configured.
    #[error("no API key configured (set OPENAI_API_KEY or GROUNDWIRE_API_KEY)")]
    ApiKeyMissing,

    /// The configured provider name is unknown.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// The provider name that was requested.
        name: String,
    },

    /// The provider could not be reached (DNS, TCP, TLS, timeouts).
    #[error("connection error: {message}")]
    Connection {
        /// Underlying transport message.
        message: String,
    },

    /// The provider answered with an error.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error message.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// The response stream broke after it was opened.
    #[error("stream error: {message}")]
    Stream {
        /// Underlying stream message.
        message: String,
    },

    /// The model produced output that could not be interpreted.
    #[error("failed to parse model response: {message}")]
    ResponseParse {
        /// What went wrong.
        message: String,
        /// The raw content that failed to parse.
        content: String,
    },
}

impl LlmError {
    /// Returns `true` for connectivity and transport failures.
    ///
    /// Only these are retried, and only these produce the
    /// "problem connecting" apology.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Stream { .. })
    }
}

/// Errors from an embedding client.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The embedding model is not known to the factory.
    #[error("unknown embedding model: {model}")]
    UnknownModel {
        /// Requested model identifier.
        model: String,
    },

    /// The embedding request failed.
    #[error("embedding request for {model} failed: {message}")]
    Request {
        /// Model identifier.
        model: String,
        /// Underlying message.
        message: String,
    },

    /// The provider returned no vector.
    #[error("embedding response for {model} was empty")]
    Empty {
        /// Model identifier.
        model: String,
    },
}

/// Errors from the grounding store registry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The named store does not exist.
    #[error("store not found: {0}")]
    NotFound(String),

    /// The store already exists.
    #[error("store already exists: {0}")]
    AlreadyExists(String),

    /// A stored or query vector has the wrong shape.
    #[error("embedding dimension mismatch in {store}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Store name.
        store: String,
        /// Dimension of the query vector.
        expected: usize,
        /// Dimension found in storage.
        actual: usize,
    },

    /// A value in the store table could not be interpreted.
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// Column or field name.
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// Filesystem failure while opening the database.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised inside the retrieval pipeline.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Discovery produced zero candidates. Terminal for the turn.
    #[error("no grounding stores available")]
    NoStores,

    /// Embedding the query for a store failed.
    #[error("embedding failed for store {store}: {source}")]
    Embedding {
        /// Store being searched.
        store: String,
        /// Underlying error.
        #[source]
        source: EmbeddingError,
    },

    /// The store registry failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A model call inside the pipeline failed.
    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),
}

/// Contract violations found while assembling model input.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A tool result has no matching tool call in the preceding assistant message.
    #[error("tool result {tool_call_id} has no matching tool call")]
    OrphanToolResult {
        /// The unmatched call id.
        tool_call_id: String,
    },
}

/// Errors from CLI command execution.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A command failed.
    #[error("{0}")]
    ExecutionFailed(String),

    /// A command argument was invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output could not be rendered.
    #[error("output error: {0}")]
    OutputFormat(String),
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Provider error.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Embedding error.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Store registry error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Retrieval pipeline error.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// History contract violation.
    #[error(transparent)]
    History(#[from] HistoryError),

    /// CLI command error.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
