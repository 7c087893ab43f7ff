//! Prompts for the answer model and the retrieval pipeline.
//!
//! The system prompt frames the streamed answer. The rephrase, select and
//! grade prompts drive the small deterministic calls of the retrieval
//! pipeline. Builders format the user message for each of those calls.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::core::RetrievalCandidate;
use crate::llm::message::{ChatMessage, Role};

/// System prompt for the answer model.
pub const SYSTEM_PROMPT: &str = r"You are a helpful assistant that answers questions using the context provided to you.

## Instructions

1. When context documents are supplied, base your answer on them. Quote or cite the source store when it helps the reader.
2. If the context does not contain the answer, say so plainly. Do not invent facts.
3. When no context is supplied, answer from general knowledge and keep the answer short.
4. Use tools only when they are offered and only when they are needed to answer.
5. Format answers in Markdown. Prefer short paragraphs and lists over long prose.";

/// System prompt for rewriting a follow-up into a standalone query.
pub const REPHRASE_PROMPT: &str = r"You rewrite follow-up questions into standalone search queries.

Given a short conversation and a follow-up question, produce a single query that can be understood without the conversation. Resolve pronouns and references using the conversation. Keep names, identifiers and numbers exactly as written.

Return ONLY the rewritten query, with no explanation, quotes or prefix. If the question is already standalone, return it unchanged.";

/// System prompt for choosing which stores to search.
pub const SELECT_PROMPT: &str = r#"You choose which document stores are most likely to answer a question.

You are given a question and a list of stores, each with a name and an optional description. Choose the stores most relevant to the question, best first, up to the stated maximum.

Return ONLY a JSON object of the form {"tables": ["STORE_A", "STORE_B"]}. Use store names exactly as listed. Do not include any other text."#;

/// System prompt for the binary relevance check.
pub const GRADE_PROMPT: &str = r#"You grade whether retrieved documents are relevant to a user question.

If the documents contain keywords or meaning related to the question, grade them as relevant. The check does not need to be strict; its goal is to filter out clearly unrelated retrievals.

Return ONLY a JSON object of the form {"binary_score": "yes"} or {"binary_score": "no"}."#;

/// Default prompt directory relative to the user's home.
const DEFAULT_PROMPT_DIR: &str = ".config/groundwire/prompts";

/// Filename for the system prompt template.
const SYSTEM_FILENAME: &str = "system.md";
/// Filename for the rephrase prompt template.
const REPHRASE_FILENAME: &str = "rephrase.md";
/// Filename for the table selection prompt template.
const SELECT_FILENAME: &str = "select.md";
/// Filename for the grading prompt template.
const GRADE_FILENAME: &str = "grade.md";

/// The prompts used during a turn.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Use [`PromptSet::load`] to resolve the prompt
/// directory from CLI flags, environment variables, or the default path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    /// System prompt for the answer model.
    pub system: String,
    /// System prompt for query rephrasing.
    pub rephrase: String,
    /// System prompt for table selection.
    pub select: String,
    /// System prompt for relevance grading.
    pub grade: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in defaults.
    ///
    /// Resolution order for `prompt_dir`:
    /// 1. Explicit `prompt_dir` argument (from `--prompt-dir` CLI flag)
    /// 2. `GROUNDWIRE_PROMPT_DIR` environment variable
    /// 3. `~/.config/groundwire/prompts/`
    ///
    /// Each file is loaded independently, so a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("GROUNDWIRE_PROMPT_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            system: load_file(SYSTEM_FILENAME, SYSTEM_PROMPT),
            rephrase: load_file(REPHRASE_FILENAME, REPHRASE_PROMPT),
            select: load_file(SELECT_FILENAME, SELECT_PROMPT),
            grade: load_file(GRADE_FILENAME, GRADE_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            rephrase: REPHRASE_PROMPT.to_string(),
            select: SELECT_PROMPT.to_string(),
            grade: GRADE_PROMPT.to_string(),
        }
    }

    /// Replaces the system and rephrase prompts with per-client overrides.
    #[must_use]
    pub fn with_overrides(mut self, system: Option<&str>, rephrase: Option<&str>) -> Self {
        if let Some(s) = system {
            self.system = s.to_string();
        }
        if let Some(r) = rephrase {
            self.rephrase = r.to_string();
        }
        self
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (SYSTEM_FILENAME, SYSTEM_PROMPT),
            (REPHRASE_FILENAME, REPHRASE_PROMPT),
            (SELECT_FILENAME, SELECT_PROMPT),
            (GRADE_FILENAME, GRADE_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in &templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    ///
    /// Returns `None` if the home directory cannot be determined.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Builds the user message for the rephrase call.
#[must_use]
pub fn build_rephrase_prompt(question: &str, prior_turns: &[&ChatMessage]) -> String {
    let mut prompt = String::from("<conversation>\n");
    for m in prior_turns {
        let speaker = match m.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System | Role::Tool => continue,
        };
        let _ = writeln!(prompt, "{speaker}: {}", m.content);
    }
    prompt.push_str("</conversation>\n\n");
    let _ = write!(prompt, "<question>{question}</question>");
    prompt
}

/// Builds the user message for the table selection call.
#[must_use]
pub fn build_select_prompt(
    question: &str,
    candidates: &[RetrievalCandidate],
    max_tables: usize,
) -> String {
    let mut prompt = format!("<question>{question}</question>\n\n<stores>\n");
    for c in candidates {
        let _ = write!(prompt, "- {}", c.name);
        if let Some(alias) = &c.alias {
            let _ = write!(prompt, " ({alias})");
        }
        if let Some(desc) = &c.description {
            let _ = write!(prompt, ": {desc}");
        }
        prompt.push('\n');
    }
    let _ = write!(prompt, "</stores>\n\nChoose at most {max_tables} stores.");
    prompt
}

/// Builds the user message for the grading call.
#[must_use]
pub fn build_grade_prompt(question: &str, documents: &str) -> String {
    format!(
        "<question>{question}</question>\n\n\
         <documents>\n{documents}\n</documents>\n\n\
         Are these documents relevant to the question?"
    )
}
