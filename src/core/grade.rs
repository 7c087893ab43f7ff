//! Binary relevance grade for retrieved context.

use serde::{Deserialize, Serialize};

/// Whether retrieved documents are relevant to the question.
///
/// Grading fails open: anything that is not a clear "no" is
/// [`Grade::Yes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    /// Relevant, or could not be determined.
    #[default]
    Yes,
    /// Explicitly judged irrelevant.
    No,
}

impl Grade {
    /// Parses a model answer (case-insensitive, tolerant of punctuation,
    /// quotes and `{"binary_score": "..."}` wrappers).
    ///
    /// Returns `None` when the answer is not binary.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed)
            && let Some(inner) = value
                .get("binary_score")
                .or_else(|| value.get("relevant"))
                .and_then(serde_json::Value::as_str)
        {
            return Self::parse(inner);
        }

        let word = trimmed
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_ascii_lowercase();
        match word.as_str() {
            "yes" | "y" | "true" | "relevant" => Some(Self::Yes),
            "no" | "n" | "false" | "irrelevant" | "not relevant" => Some(Self::No),
            _ => None,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }

    /// Returns `true` for [`Grade::Yes`].
    #[must_use]
    pub const fn is_relevant(self) -> bool {
        matches!(self, Self::Yes)
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
