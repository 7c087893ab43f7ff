//! CLI layer for groundwire.
//!
//! Provides the command-line interface using clap, with commands for
//! initializing the store database, managing stores, ingesting documents
//! and asking questions.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands, StoreCommands};
