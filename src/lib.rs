//! # groundwire
//!
//! Request-time orchestration for grounded, streamed LLM chat.
//!
//! Each user turn is routed by its enabled tools to one of four paths:
//! a plain completion, vector-search grounding over registered document
//! stores, an alternate tool family, or every tool at once. Grounded turns
//! run a retrieval pipeline (rephrase, discover, select up to three stores,
//! search each, dedup, rank, grade) and hand the result to the model as a
//! retriever tool result. Completions are streamed; text deltas go out as
//! they arrive while tool-call fragments are reassembled by index.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use groundwire::chat::{ChatEngine, ProgressSink, TurnRequest};
//! use groundwire::core::ConversationState;
//! use groundwire::embedding::openai::OpenAiEmbedderFactory;
//! use groundwire::llm::{EngineConfig, create_provider};
//! use groundwire::registry::{ClientSettings, InMemorySettingsRegistry, SqliteStoreRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> groundwire::Result<()> {
//! let config = EngineConfig::from_env()?;
//! let provider = create_provider(&config)?;
//! let stores = Arc::new(SqliteStoreRegistry::open(std::path::Path::new(".groundwire/stores.db"))?);
//! let embedders = Arc::new(OpenAiEmbedderFactory::new(&config));
//! let settings = Arc::new(InMemorySettingsRegistry::new(ClientSettings::default()));
//! let engine = ChatEngine::new(config, provider, stores, embedders, settings);
//!
//! let request = TurnRequest::new(ConversationState::new("thread-1"), "What changed in v2?")
//!     .with_tools(vec!["vs_search".to_string()]);
//! let outcome = engine
//!     .turn(request, ProgressSink::discard(), CancellationToken::new())
//!     .await;
//! assert!(!outcome.message.content.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod cli;
pub mod core;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod prompt;
pub mod registry;
pub mod retrieval;

pub use crate::chat::{ChatEngine, ChatEvent, ProgressSink, Route, TurnOutcome, TurnRequest, TurnStatus};
pub use crate::core::{ConversationState, RetrievalCandidate, RetrievedDocument, VsMetadata};
pub use error::{Error, Result};
pub use llm::{ChatMessage, EngineConfig, LlmProvider};
pub use retrieval::{RetrievalPipeline, VectorSearchResult};
