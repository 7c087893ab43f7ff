//! Route selection from the enabled tool capabilities.

use std::fmt;

use crate::llm::tool::{ALTERNATE_TOOL_PREFIX, VECTOR_SEARCH_PREFIX};

/// How a turn is orchestrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Straight to the model, no tools.
    PlainCompletion,
    /// Retrieval pipeline first, then the model.
    VectorSearch,
    /// Model with alternate-family tool schemas.
    AlternateTool,
    /// Retrieval pipeline first, then the model with alternate tools.
    MultiTool,
}

impl Route {
    /// Route label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlainCompletion => "plain-completion",
            Self::VectorSearch => "vector-search-orchestration",
            Self::AlternateTool => "alternate-tool-orchestration",
            Self::MultiTool => "multi-tool-orchestration",
        }
    }

    /// Whether the retrieval pipeline runs before the first completion.
    #[must_use]
    pub const fn retrieves(self) -> bool {
        matches!(self, Self::VectorSearch | Self::MultiTool)
    }

    /// Whether alternate-family tool schemas are offered to the model.
    #[must_use]
    pub const fn offers_tools(self) -> bool {
        matches!(self, Self::AlternateTool | Self::MultiTool)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides the route for a set of enabled tool names.
///
/// Names are classified by prefix; unknown and blank names are ignored.
#[must_use]
pub fn route<S: AsRef<str>>(enabled_tools: &[S]) -> Route {
    let mut vector = false;
    let mut alternate = false;
    for name in enabled_tools {
        let name = name.as_ref().trim();
        if name.starts_with(VECTOR_SEARCH_PREFIX) {
            vector = true;
        } else if name.starts_with(ALTERNATE_TOOL_PREFIX) {
            alternate = true;
        }
    }

    match (vector, alternate) {
        (true, true) => Route::MultiTool,
        (true, false) => Route::VectorSearch,
        (false, true) => Route::AlternateTool,
        (false, false) => Route::PlainCompletion,
    }
}

/// Parses a comma-separated tool list. Absent input means no tools.
#[must_use]
pub fn parse_tool_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Alternate-family names from an enabled tool list.
#[must_use]
pub fn alternate_tools(enabled_tools: &[String]) -> Vec<String> {
    enabled_tools
        .iter()
        .map(|t| t.trim())
        .filter(|t| t.starts_with(ALTERNATE_TOOL_PREFIX))
        .map(str::to_string)
        .collect()
}
