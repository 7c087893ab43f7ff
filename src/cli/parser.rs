//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::registry::DEFAULT_DB_PATH;

/// Groundwire: grounded, streamed LLM chat over your own document stores.
///
/// Register vector stores, ingest documents into them, and ask questions
/// that are answered from the retrieved context.
#[derive(Parser, Debug)]
#[command(name = "groundwire")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the store database file.
    ///
    /// Defaults to `.groundwire/stores.db` in the current directory.
    #[arg(short, long, env = "GROUNDWIRE_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Enable verbose (debug) logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json, ndjson).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the store database.
    ///
    /// Creates the database file and schema if they don't exist.
    #[command(after_help = r#"Examples:
  groundwire init                    # Initialize in current directory
  groundwire init --force            # Re-initialize (destroys existing stores)
  groundwire --db-path ./my.db init  # Initialize with custom path
"#)]
    Init {
        /// Force re-initialization (destroys existing data).
        #[arg(short, long)]
        force: bool,
    },

    /// Grounding store operations (add, list, remove).
    #[command(subcommand)]
    Store(StoreCommands),

    /// Split a text file into paragraphs, embed them, and add them to a store.
    #[command(after_help = r#"Examples:
  groundwire ingest --store handbook ./handbook.md
  groundwire --format json ingest -s faq faq.txt
"#)]
    Ingest {
        /// Target store name.
        #[arg(short, long)]
        store: String,

        /// Text file to ingest.
        file: PathBuf,
    },

    /// Ask a question and stream the answer to stdout.
    #[command(after_help = r#"Examples:
  groundwire ask "What is our refund policy?"                 # Plain completion
  groundwire ask "Summarize the handbook" --tools vs_search   # Grounded answer
  groundwire ask "And for EU customers?" --state thread.json  # Continue a thread
  groundwire ask "hi" --settings client.json --model gpt-4o
  groundwire --format json ask "Where is the office?" --tools vs_search | jq .metadata
"#)]
    Ask {
        /// The user's message.
        message: String,

        /// Thread identifier for new threads.
        #[arg(short, long, default_value = "cli")]
        thread: String,

        /// JSON file holding the thread state; read if present, written after the turn.
        #[arg(long)]
        state: Option<PathBuf>,

        /// Comma-separated tool capabilities (e.g. `vs_search`, `sql_query`).
        ///
        /// Overrides the tools from `--settings`.
        #[arg(long)]
        tools: Option<String>,

        /// Client settings JSON file.
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Chat model override.
        #[arg(short, long)]
        model: Option<String>,

        /// Directory containing prompt template files.
        #[arg(long, env = "GROUNDWIRE_PROMPT_DIR")]
        prompt_dir: Option<PathBuf>,

        /// Client id whose stores are visible.
        #[arg(long)]
        client: Option<String>,
    },

    /// Write the default prompt templates to a directory.
    ///
    /// Existing files are left untouched.
    #[command(after_help = r#"Examples:
  groundwire init-prompts                    # ~/.config/groundwire/prompts
  groundwire init-prompts ./prompts          # Custom directory
"#)]
    InitPrompts {
        /// Target directory (defaults to `~/.config/groundwire/prompts`).
        dir: Option<PathBuf>,
    },
}

/// Store subcommands.
#[derive(Subcommand, Debug)]
pub enum StoreCommands {
    /// Register a grounding store.
    #[command(after_help = r#"Examples:
  groundwire store add handbook --embed-model text-embedding-3-small
  groundwire store add faq -e text-embedding-3-small --description "Customer FAQ"
  groundwire store add acme-docs -e text-embedding-3-large --client acme --distance dot_product
"#)]
    Add {
        /// Store name.
        name: String,

        /// Embedding model the store's vectors come from.
        #[arg(short, long)]
        embed_model: String,

        /// Distance metric: cosine, `dot_product`, euclidean.
        #[arg(long, default_value = "cosine")]
        distance: String,

        /// Vector index kind: hnsw, flat.
        #[arg(long, default_value = "hnsw")]
        index_kind: String,

        /// Human-friendly alias.
        #[arg(long)]
        alias: Option<String>,

        /// What the store contains (shown to the model during table selection).
        #[arg(short, long)]
        description: Option<String>,

        /// Owning client; omit to share with every client.
        #[arg(long)]
        client: Option<String>,
    },

    /// List registered stores.
    List,

    /// Remove a store and its documents.
    Remove {
        /// Store name.
        name: String,
    },
}

impl Cli {
    /// Returns the database path, using the default if not specified.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_db_path() {
        let cli = Cli {
            db_path: None,
            verbose: false,
            format: "text".to_string(),
            command: Commands::Store(StoreCommands::List),
        };
        assert_eq!(cli.get_db_path(), PathBuf::from(DEFAULT_DB_PATH));
    }

    #[test]
    fn test_custom_db_path() {
        let cli = Cli {
            db_path: Some(PathBuf::from("/custom/path.db")),
            verbose: false,
            format: "text".to_string(),
            command: Commands::Store(StoreCommands::List),
        };
        assert_eq!(cli.get_db_path(), PathBuf::from("/custom/path.db"));
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from([
            "groundwire",
            "ask",
            "what is new?",
            "--tools",
            "vs_search,sql_query",
            "--model",
            "gpt-4o",
        ])
        .unwrap_or_else(|_| unreachable!());
        match cli.command {
            Commands::Ask {
                message,
                thread,
                tools,
                model,
                ..
            } => {
                assert_eq!(message, "what is new?");
                assert_eq!(thread, "cli");
                assert_eq!(tools.as_deref(), Some("vs_search,sql_query"));
                assert_eq!(model.as_deref(), Some("gpt-4o"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_store_add_defaults() {
        let cli = Cli::try_parse_from(["groundwire", "store", "add", "docs", "-e", "m"])
            .unwrap_or_else(|_| unreachable!());
        match cli.command {
            Commands::Store(StoreCommands::Add {
                name,
                distance,
                index_kind,
                client,
                ..
            }) => {
                assert_eq!(name, "docs");
                assert_eq!(distance, "cosine");
                assert_eq!(index_kind, "hnsw");
                assert!(client.is_none());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_ingest_requires_store() {
        assert!(Cli::try_parse_from(["groundwire", "ingest", "file.txt"]).is_err());
    }
}
