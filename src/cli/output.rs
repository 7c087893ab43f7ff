//! Output formatting for CLI commands.

use serde::Serialize;

use crate::registry::StoreRecord;

/// How command results are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
    /// One JSON value per line.
    Ndjson,
}

impl OutputFormat {
    /// Parses a format name, defaulting to text for anything unknown.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "ndjson" | "jsonl" => Self::Ndjson,
            _ => Self::Text,
        }
    }

    /// Whether the format is machine-readable.
    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::Ndjson)
    }

    /// Serializes a value for this format.
    ///
    /// `Ndjson` and `Text` get compact single-line JSON; `Json` is
    /// pretty-printed.
    pub fn to_json<T: Serialize>(self, value: &T) -> String {
        let rendered = match self {
            Self::Json => serde_json::to_string_pretty(value),
            Self::Text | Self::Ndjson => serde_json::to_string(value),
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\":\"serialization failed: {e}\"}}"))
    }
}

/// Renders the store table for `store list`.
pub fn format_store_list(records: &[StoreRecord], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                return "No stores registered.\n".to_string();
            }
            let mut output = format!(
                "{:<24} {:<28} {:<12} {:>6}  {}\n",
                "NAME", "EMBED MODEL", "DISTANCE", "DOCS", "CLIENT"
            );
            for record in records {
                output.push_str(&format!(
                    "{:<24} {:<28} {:<12} {:>6}  {}\n",
                    record.candidate.name,
                    record.candidate.embed_model,
                    record.candidate.distance,
                    record.documents,
                    record.client_id.as_deref().unwrap_or("(shared)")
                ));
            }
            output
        }
        OutputFormat::Json => format.to_json(&store_values(records)),
        OutputFormat::Ndjson => {
            let mut output = String::new();
            for value in store_values(records) {
                output.push_str(&format.to_json(&value));
                output.push('\n');
            }
            output
        }
    }
}

fn store_values(records: &[StoreRecord]) -> Vec<serde_json::Value> {
    records
        .iter()
        .map(|r| {
            serde_json::json!({
                "name": r.candidate.name,
                "embed_model": r.candidate.embed_model,
                "distance": r.candidate.distance,
                "index_kind": r.candidate.index_kind,
                "alias": r.candidate.alias,
                "description": r.candidate.description,
                "client_id": r.client_id,
                "documents": r.documents,
            })
        })
        .collect()
}
