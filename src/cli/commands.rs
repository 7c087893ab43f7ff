//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

// Allow certain patterns that improve readability in CLI output formatting
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::format_push_string)]

use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::{ChatEngine, ChatEvent, ProgressSink, TurnOutcome, TurnRequest};
use crate::chat::router::parse_tool_list;
use crate::cli::output::{OutputFormat, format_store_list};
use crate::cli::parser::{Cli, Commands, StoreCommands};
use crate::core::{ConversationState, RetrievalCandidate};
use crate::embedding::EmbedderFactory;
use crate::embedding::openai::OpenAiEmbedderFactory;
use crate::error::{CommandError, Result};
use crate::llm::{EngineConfig, create_provider};
use crate::prompt::PromptSet;
use crate::registry::{
    ClientSettings, InMemorySettingsRegistry, InMemoryStoreRegistry, SqliteStoreRegistry,
    StoreRegistry,
};

/// Paragraphs embedded per request during ingest.
const INGEST_BATCH_SIZE: usize = 64;

// ==================== Parameter Structs ====================

/// Parameters for the ask command.
#[derive(Debug, Clone)]
pub struct AskParams<'a> {
    /// The user's message.
    pub message: &'a str,
    /// Thread id for a fresh thread.
    pub thread: &'a str,
    /// Thread state file.
    pub state: Option<&'a Path>,
    /// Comma-separated tool capabilities.
    pub tools: Option<&'a str>,
    /// Client settings file.
    pub settings: Option<&'a Path>,
    /// Chat model override.
    pub model: Option<&'a str>,
    /// Prompt template directory.
    pub prompt_dir: Option<&'a Path>,
    /// Client id.
    pub client: Option<&'a str>,
}

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if the command fails.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let db_path = cli.get_db_path();

    match &cli.command {
        Commands::Init { force } => cmd_init(&db_path, *force, format),
        Commands::Store(sub) => execute_store(sub, &db_path, format),
        Commands::Ingest { store, file } => cmd_ingest(&db_path, store, file, format),
        Commands::Ask {
            message,
            thread,
            state,
            tools,
            settings,
            model,
            prompt_dir,
            client,
        } => {
            let params = AskParams {
                message,
                thread,
                state: state.as_deref(),
                tools: tools.as_deref(),
                settings: settings.as_deref(),
                model: model.as_deref(),
                prompt_dir: prompt_dir.as_deref(),
                client: client.as_deref(),
            };
            cmd_ask(&db_path, &params, format)
        }
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

fn execute_store(sub: &StoreCommands, db_path: &Path, format: OutputFormat) -> Result<String> {
    match sub {
        StoreCommands::Add {
            name,
            embed_model,
            distance,
            index_kind,
            alias,
            description,
            client,
        } => {
            let candidate = RetrievalCandidate {
                name: name.clone(),
                embed_model: embed_model.clone(),
                distance: distance.parse()?,
                index_kind: index_kind.parse()?,
                alias: alias.clone(),
                description: description.clone(),
            };
            cmd_store_add(db_path, &candidate, client.as_deref(), format)
        }
        StoreCommands::List => cmd_store_list(db_path, format),
        StoreCommands::Remove { name } => cmd_store_remove(db_path, name, format),
    }
}

// ==================== Helpers ====================

/// Opens an initialized store database.
fn open_registry(db_path: &Path) -> Result<SqliteStoreRegistry> {
    if !db_path.exists() {
        return Err(CommandError::ExecutionFailed(format!(
            "Database not initialized at {}. Run `groundwire init` first.",
            db_path.display()
        ))
        .into());
    }
    Ok(SqliteStoreRegistry::open(db_path)?)
}

fn engine_config(model: Option<&str>, prompt_dir: Option<&Path>) -> Result<EngineConfig> {
    let mut builder = EngineConfig::builder();
    if let Some(model) = model {
        builder = builder.default_model(model);
    }
    if let Some(dir) = prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    let config = builder.from_env().build().map_err(|e| {
        CommandError::ExecutionFailed(format!("Engine configuration error: {e}"))
    })?;
    Ok(config)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    let rt = tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}"))
    })?;
    Ok(rt)
}

/// Splits text into non-empty paragraphs on blank lines.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    // Pattern is a literal; construction cannot fail.
    let Ok(blank_line) = Regex::new(r"\n[ \t]*\r?\n") else {
        return vec![text.trim().to_string()];
    };
    blank_line
        .split(&text.replace("\r\n", "\n"))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

// ==================== Commands ====================

fn cmd_init(db_path: &Path, force: bool, format: OutputFormat) -> Result<String> {
    if db_path.exists() && !force {
        return Err(CommandError::ExecutionFailed(
            "Database already exists. Use --force to reinitialize.".to_string(),
        )
        .into());
    }

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            CommandError::ExecutionFailed(format!("Failed to create directory: {e}"))
        })?;
    }

    if force && db_path.exists() {
        std::fs::remove_file(db_path).map_err(|e| {
            CommandError::ExecutionFailed(format!("Failed to remove existing database: {e}"))
        })?;
    }

    SqliteStoreRegistry::open(db_path)?;

    match format {
        OutputFormat::Text => Ok(format!(
            "Initialized store database at: {}\n",
            db_path.display()
        )),
        OutputFormat::Json | OutputFormat::Ndjson => {
            let json = serde_json::json!({
                "success": true,
                "path": db_path.to_string_lossy(),
                "force": force
            });
            Ok(format.to_json(&json))
        }
    }
}

fn cmd_store_add(
    db_path: &Path,
    candidate: &RetrievalCandidate,
    client: Option<&str>,
    format: OutputFormat,
) -> Result<String> {
    let registry = open_registry(db_path)?;
    registry.add_store(candidate, client)?;

    match format {
        OutputFormat::Text => Ok(format!(
            "Added store '{}' (model: {}, distance: {})\n",
            candidate.name, candidate.embed_model, candidate.distance
        )),
        OutputFormat::Json | OutputFormat::Ndjson => {
            let json = serde_json::json!({
                "success": true,
                "store": candidate,
                "client_id": client,
            });
            Ok(format.to_json(&json))
        }
    }
}

fn cmd_store_list(db_path: &Path, format: OutputFormat) -> Result<String> {
    let registry = open_registry(db_path)?;
    let records = registry.records()?;
    Ok(format_store_list(&records, format))
}

fn cmd_store_remove(db_path: &Path, name: &str, format: OutputFormat) -> Result<String> {
    let registry = open_registry(db_path)?;
    if !registry.remove_store(name)? {
        return Err(CommandError::InvalidArgument(format!("no such store: {name}")).into());
    }

    match format {
        OutputFormat::Text => Ok(format!("Removed store '{}'\n", name)),
        OutputFormat::Json | OutputFormat::Ndjson => {
            Ok(format.to_json(&serde_json::json!({ "success": true, "removed": name })))
        }
    }
}

fn cmd_ingest(db_path: &Path, store: &str, file: &Path, format: OutputFormat) -> Result<String> {
    let registry = open_registry(db_path)?;
    let candidate = registry.get_store(store)?;

    let text = std::fs::read_to_string(file).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to read {}: {e}", file.display()))
    })?;
    let paragraphs = split_paragraphs(&text);
    if paragraphs.is_empty() {
        return Err(CommandError::InvalidArgument(format!(
            "{} contains no text to ingest",
            file.display()
        ))
        .into());
    }

    let config = engine_config(None, None)?;
    let embedder = OpenAiEmbedderFactory::new(&config).create(&candidate.embed_model)?;

    let rt = runtime()?;
    let chunks = rt.block_on(async {
        let mut chunks = Vec::with_capacity(paragraphs.len());
        for batch in paragraphs.chunks(INGEST_BATCH_SIZE) {
            let vectors = embedder.embed(batch).await?;
            debug!(store, batch = batch.len(), "embedded paragraphs");
            chunks.extend(batch.iter().cloned().zip(vectors));
        }
        Ok::<_, crate::error::EmbeddingError>(chunks)
    })?;

    let added = registry.add_documents(store, &chunks)?;
    info!(store, added, file = %file.display(), "ingested file");

    match format {
        OutputFormat::Text => Ok(format!(
            "Ingested {} paragraph(s) from {} into '{}'\n",
            added,
            file.display(),
            store
        )),
        OutputFormat::Json | OutputFormat::Ndjson => {
            let json = serde_json::json!({
                "success": true,
                "store": store,
                "file": file.to_string_lossy(),
                "documents": added,
                "embed_model": candidate.embed_model,
            });
            Ok(format.to_json(&json))
        }
    }
}

fn load_state(path: Option<&Path>, thread: &str) -> Result<ConversationState> {
    match path {
        Some(path) if path.exists() => {
            let raw = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        _ => Ok(ConversationState::new(thread)),
    }
}

fn cmd_ask(db_path: &Path, params: &AskParams<'_>, format: OutputFormat) -> Result<String> {
    let settings = match params.settings {
        Some(path) => ClientSettings::from_json_file(path)?,
        None => ClientSettings::default(),
    };

    let config = engine_config(params.model, params.prompt_dir)?;
    let provider = create_provider(&config).map_err(|e| {
        CommandError::ExecutionFailed(format!("Provider creation failed: {e}"))
    })?;

    let stores: Arc<dyn StoreRegistry> = if db_path.exists() {
        Arc::new(SqliteStoreRegistry::open(db_path)?)
    } else {
        warn!(path = %db_path.display(), "no store database; retrieval has no stores");
        Arc::new(InMemoryStoreRegistry::new())
    };
    let embedders = Arc::new(OpenAiEmbedderFactory::new(&config));
    let settings_registry = Arc::new(InMemorySettingsRegistry::new(settings));

    let engine = ChatEngine::new(config, provider, stores, embedders, settings_registry);

    let state = load_state(params.state, params.thread)?;
    let mut request = TurnRequest::new(state, params.message);
    if let Some(tools) = params.tools {
        request = request.with_tools(parse_tool_list(Some(tools)));
    }
    if let Some(client) = params.client {
        request = request.with_client(client);
    }
    if let Some(model) = params.model {
        request = request.with_model(model);
    }

    let stream_text = format == OutputFormat::Text;
    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let (sink, rx) = ProgressSink::channel();
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        let (outcome, ()) = tokio::join!(
            engine.turn(request, sink, cancel),
            print_events(UnboundedReceiverStream::new(rx), stream_text)
        );
        outcome
    });

    if let Some(path) = params.state {
        std::fs::write(path, serde_json::to_string_pretty(&outcome.state)?)?;
    }

    match format {
        OutputFormat::Text => Ok("\n".to_string()),
        OutputFormat::Json | OutputFormat::Ndjson => Ok(format.to_json(&outcome_json(&outcome))),
    }
}

/// Drains turn events, writing answer tokens to stdout as they arrive.
async fn print_events(mut events: UnboundedReceiverStream<ChatEvent>, stream_text: bool) {
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            ChatEvent::Token(text) if stream_text => {
                if stdout
                    .write_all(text.as_bytes())
                    .and_then(|()| stdout.flush())
                    .is_err()
                {
                    debug!("stdout closed; dropping remaining tokens");
                }
            }
            ChatEvent::Usage(usage) => debug!(
                prompt = usage.prompt_tokens,
                completion = usage.completion_tokens,
                "usage"
            ),
            ChatEvent::Grounding(meta) => debug!(
                searched = ?meta.searched_tables,
                failed = ?meta.failed_tables,
                documents = meta.documents,
                "grounding"
            ),
            ChatEvent::Token(_) | ChatEvent::Finished => {}
        }
    }
}

fn outcome_json(outcome: &TurnOutcome) -> serde_json::Value {
    serde_json::json!({
        "thread_id": outcome.state.thread_id,
        "route": outcome.route.as_str(),
        "status": outcome.status.as_str(),
        "message": outcome.message.content,
        "usage": outcome.usage,
        "metadata": outcome.state.vs_metadata,
    })
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ))
            } else {
                let mut output = format!(
                    "Wrote {} prompt template(s) to: {}\n",
                    written.len(),
                    target_dir.display()
                );
                for path in &written {
                    output.push_str(&format!(
                        "  {}\n",
                        path.file_name()
                            .and_then(|n| n.to_str())
                            .unwrap_or("unknown")
                    ));
                }
                output.push_str("\nEdit these files to customize the chat prompts.\n");
                Ok(output)
            }
        }
        OutputFormat::Json | OutputFormat::Ndjson => {
            let files: Vec<String> = written
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect();
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": files,
            });
            Ok(format.to_json(&json))
        }
    }
}
