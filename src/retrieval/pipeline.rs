//! The retrieval pipeline run for vector-search turns.

use std::fmt::Write;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::dedup::{dedup, rank_and_cap};
use super::discovery::discover;
use super::grader::grade;
use super::rephrase::{Rephrased, rephrase, should_rephrase};
use super::search::SearchMode;
use super::selector::select_tables;
use crate::core::{Grade, RetrievalCandidate, RetrievedDocument, VsMetadata};
use crate::embedding::EmbedderFactory;
use crate::error::{EmbeddingError, RetrievalError};
use crate::llm::message::ChatMessage;
use crate::llm::provider::LlmProvider;
use crate::prompt::PromptSet;
use crate::registry::{ClientSettings, StoreRegistry};

/// Tool content used when nothing relevant was retrieved.
pub const NO_DOCUMENTS: &str = "No relevant documents were found.";

/// What one turn's retrieval needs to know.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalInput<'a> {
    /// The user's latest question.
    pub question: &'a str,
    /// Prior user/assistant turns, oldest first.
    pub prior_turns: &'a [&'a ChatMessage],
    /// Client settings for this turn.
    pub settings: &'a ClientSettings,
    /// Client whose stores are visible.
    pub client_id: Option<&'a str>,
    /// Model used for rephrase, selection and grading.
    pub model: &'a str,
    /// Prompts for the pipeline calls.
    pub prompts: &'a PromptSet,
}

/// Output of a retrieval run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VectorSearchResult {
    /// Formatted document text handed to the model. May be empty.
    pub context: String,
    /// Documents after dedup, ranking and grading.
    pub documents: Vec<RetrievedDocument>,
    /// Stores searched successfully.
    pub searched_tables: Vec<String>,
    /// Stores whose search failed.
    pub failed_tables: Vec<String>,
    /// `documents.len()`.
    pub document_count: usize,
    /// Query used for search.
    pub query: String,
    /// Whether `query` was rephrased.
    pub rephrased: bool,
    /// Relevance grade.
    pub relevant: Grade,
    /// Terminal error for the turn, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when `error` is because no store was available, as opposed to
    /// the registry itself failing.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub no_stores: bool,
}

impl VectorSearchResult {
    /// Grounding metadata for conversation state.
    #[must_use]
    pub fn metadata(&self) -> VsMetadata {
        VsMetadata {
            searched_tables: self.searched_tables.clone(),
            failed_tables: self.failed_tables.clone(),
            documents: self.document_count,
            query: self.query.clone(),
            rephrased: self.rephrased,
            relevant: self.relevant,
        }
    }

    /// Content of the synthetic retriever tool result.
    #[must_use]
    pub fn tool_content(&self) -> String {
        if self.context.is_empty() {
            NO_DOCUMENTS.to_string()
        } else {
            self.context.clone()
        }
    }
}

/// Runs rephrase, discovery, selection, search, dedup, ranking and grading.
pub struct RetrievalPipeline {
    provider: Arc<dyn LlmProvider>,
    stores: Arc<dyn StoreRegistry>,
    embedders: Arc<dyn EmbedderFactory>,
    utility_max_tokens: u32,
}

impl RetrievalPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        stores: Arc<dyn StoreRegistry>,
        embedders: Arc<dyn EmbedderFactory>,
        utility_max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            stores,
            embedders,
            utility_max_tokens,
        }
    }

    /// Runs the pipeline. Never fails; a terminal problem is reported in
    /// [`VectorSearchResult::error`].
    pub async fn run(&self, input: RetrievalInput<'_>) -> VectorSearchResult {
        let settings = input.settings;

        let Rephrased { query, rephrased } =
            if should_rephrase(settings.use_history, settings.rephrase, input.prior_turns.len()) {
                rephrase(
                    self.provider.as_ref(),
                    input.model,
                    &input.prompts.rephrase,
                    input.question,
                    input.prior_turns,
                    self.utility_max_tokens,
                )
                .await
            } else {
                Rephrased::original(input.question)
            };

        let mut result = VectorSearchResult {
            query,
            rephrased,
            ..VectorSearchResult::default()
        };

        let candidates = match discover(self.stores.as_ref(), settings, input.client_id).await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "retrieval aborted");
                result.no_stores = matches!(e, RetrievalError::NoStores);
                result.error = Some(e.to_string());
                return result;
            }
        };

        let selected = select_tables(
            self.provider.as_ref(),
            input.model,
            &input.prompts.select,
            &result.query,
            &candidates,
            settings.max_tables,
            self.utility_max_tokens,
        )
        .await;

        let mut found = Vec::new();
        for store in &selected {
            match self.search_store(store, &result.query, &settings.search).await {
                Ok(docs) => {
                    debug!(store = %store.name, count = docs.len(), "searched store");
                    result.searched_tables.push(store.name.clone());
                    found.extend(docs);
                }
                Err(e) => {
                    warn!(store = %store.name, error = %e, "store search failed, continuing");
                    result.failed_tables.push(store.name.clone());
                }
            }
        }

        let mut documents = rank_and_cap(dedup(found), settings.search.top_k());

        if settings.grading && !documents.is_empty() {
            result.relevant = grade(
                self.provider.as_ref(),
                input.model,
                &input.prompts.grade,
                &result.query,
                &join_contents(&documents),
                self.utility_max_tokens,
            )
            .await;
            if !result.relevant.is_relevant() {
                documents.clear();
            }
        }

        result.context = format_context(&documents);
        result.document_count = documents.len();
        result.documents = documents;

        info!(
            searched = result.searched_tables.len(),
            failed = result.failed_tables.len(),
            documents = result.document_count,
            rephrased = result.rephrased,
            relevant = %result.relevant,
            "retrieval finished"
        );
        result
    }

    async fn search_store(
        &self,
        store: &RetrievalCandidate,
        query: &str,
        mode: &SearchMode,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        let embedding_error = |source: EmbeddingError| RetrievalError::Embedding {
            store: store.name.clone(),
            source,
        };
        let embedder = self
            .embedders
            .create(&store.embed_model)
            .map_err(embedding_error)?;
        let vector = embedder.embed_query(query).await.map_err(embedding_error)?;
        Ok(self.stores.similarity_search(store, &vector, mode).await?)
    }
}

fn join_contents(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Numbered document blocks with their source store.
fn format_context(documents: &[RetrievedDocument]) -> String {
    let mut out = String::new();
    for (i, d) in documents.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let _ = write!(out, "[{}] source: {}\n{}", i + 1, d.source, d.content);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::mock::{MockEmbedderFactory, embed_words};
    use crate::llm::message::{assistant_message, user_message};
    use crate::llm::mock::{MockFailure, MockProvider};
    use crate::registry::InMemoryStoreRegistry;

    const CHUNKS: &[(&str, &str, &str)] = &[
        ("POLICIES", "m", "Refunds are accepted within 30 days of purchase."),
        ("POLICIES", "m", "Shipping is free over 50 dollars."),
        ("FAQ", "m", "Refunds are accepted within 30 days of purchase."),
        ("FAQ", "m", "Support is available on weekdays."),
        ("LEGACY", "broken", "Refunds used to take 60 days."),
    ];

    fn registry() -> Arc<InMemoryStoreRegistry> {
        let reg = InMemoryStoreRegistry::new();
        for store in ["FAQ", "LEGACY", "POLICIES"] {
            let model = CHUNKS.iter().find(|c| c.0 == store).map_or("m", |c| c.1);
            reg.add_store(RetrievalCandidate::new(store, model), None)
                .unwrap_or_else(|_| unreachable!());
        }
        for (store, _, text) in CHUNKS {
            reg.add_chunk(store, *text, embed_words(text))
                .unwrap_or_else(|_| unreachable!());
        }
        Arc::new(reg)
    }

    fn pipeline(provider: &Arc<MockProvider>, stores: Arc<dyn StoreRegistry>) -> RetrievalPipeline {
        RetrievalPipeline::new(
            provider.clone(),
            stores,
            Arc::new(MockEmbedderFactory::default().failing_for("broken")),
            256,
        )
    }

    fn settings() -> ClientSettings {
        ClientSettings {
            grading: false,
            ..ClientSettings::default()
        }
    }

    async fn run(p: &RetrievalPipeline, settings: &ClientSettings, prior: &[&ChatMessage]) -> VectorSearchResult {
        let prompts = PromptSet::defaults();
        p.run(RetrievalInput {
            question: "how long do refunds take",
            prior_turns: prior,
            settings,
            client_id: None,
            model: "m",
            prompts: &prompts,
        })
        .await
    }

    #[tokio::test]
    async fn test_one_failing_store_does_not_abort() {
        let provider = Arc::new(MockProvider::new().with_chat(r#"{"tables": ["POLICIES", "LEGACY", "FAQ"]}"#));
        let p = pipeline(&provider, registry());
        let result = run(&p, &settings(), &[]).await;

        assert!(result.error.is_none());
        assert_eq!(result.failed_tables, vec!["LEGACY".to_string()]);
        assert_eq!(result.searched_tables.len(), 2);
        assert!(result.documents.iter().all(|d| d.source != "LEGACY"));
        assert!(!result.documents.is_empty());
        assert_eq!(result.document_count, result.documents.len());
    }

    #[tokio::test]
    async fn test_duplicates_across_stores_collapse() {
        let provider = Arc::new(MockProvider::new().with_chat(r#"["POLICIES", "FAQ"]"#));
        let p = pipeline(&provider, registry());
        let result = run(&p, &settings(), &[]).await;
        let refunds = result
            .documents
            .iter()
            .filter(|d| d.content.starts_with("Refunds are accepted"))
            .count();
        assert_eq!(refunds, 1);
        assert!(result.context.starts_with("[1] source: "));
    }

    #[tokio::test]
    async fn test_grader_failure_keeps_documents() {
        let provider = Arc::new(
            MockProvider::new()
                .with_chat(r#"["POLICIES"]"#)
                .with_chat_error(MockFailure::Api),
        );
        let p = pipeline(&provider, registry());
        let graded = ClientSettings::default();
        let result = run(&p, &graded, &[]).await;
        assert_eq!(result.relevant, Grade::Yes);
        assert_eq!(result.document_count, 2);
        assert_eq!(provider.chat_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_grade_no_discards_documents() {
        let provider = Arc::new(MockProvider::new().with_chat(r#"["FAQ"]"#).with_chat("no"));
        let p = pipeline(&provider, registry());
        let result = run(&p, &ClientSettings::default(), &[]).await;
        assert_eq!(result.relevant, Grade::No);
        assert!(result.documents.is_empty());
        assert_eq!(result.tool_content(), NO_DOCUMENTS);
        assert_eq!(result.searched_tables, vec!["FAQ".to_string()]);
    }

    #[tokio::test]
    async fn test_no_stores_is_terminal() {
        let provider = Arc::new(MockProvider::new());
        let p = pipeline(&provider, Arc::new(InMemoryStoreRegistry::new()));
        let result = run(&p, &settings(), &[]).await;
        assert_eq!(result.error.as_deref(), Some("no grounding stores available"));
        assert!(result.no_stores);
        assert!(result.documents.is_empty());
        assert!(result.searched_tables.is_empty());
        assert!(provider.chat_requests().is_empty());
    }

    #[tokio::test]
    async fn test_static_store_skips_selection_call() {
        let provider = Arc::new(MockProvider::new());
        let p = pipeline(&provider, registry());
        let static_only = ClientSettings {
            discovery: false,
            static_store: Some(RetrievalCandidate::new("FAQ", "m")),
            ..settings()
        };
        let result = run(&p, &static_only, &[]).await;
        assert_eq!(result.searched_tables, vec!["FAQ".to_string()]);
        assert!(provider.chat_requests().is_empty());
        assert_eq!(result.metadata().documents, 2);
    }

    #[tokio::test]
    async fn test_rephrase_with_enough_history() {
        let provider = Arc::new(
            MockProvider::new()
                .with_chat("refund processing time")
                .with_chat(r#"["FAQ"]"#),
        );
        let p = pipeline(&provider, registry());
        let q = user_message("tell me about refunds");
        let a = assistant_message("Refunds are supported.");
        let result = run(&p, &settings(), &[&q, &a]).await;
        assert!(result.rephrased);
        assert_eq!(result.query, "refund processing time");
        assert!(result.metadata().rephrased);
    }

    #[tokio::test]
    async fn test_top_k_caps_total() {
        let provider = Arc::new(MockProvider::new().with_chat(r#"["POLICIES", "FAQ"]"#));
        let p = pipeline(&provider, registry());
        let capped = ClientSettings {
            search: SearchMode::Similarity { top_k: 1 },
            ..settings()
        };
        let result = run(&p, &capped, &[]).await;
        assert_eq!(result.document_count, 1);
    }
}
