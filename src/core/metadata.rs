//! Parser for the backend's `formatted_metadata` annotation string.
//!
//! The backend emits one citation per line:
//!
//! ```text
//! - [Title](https://link) | authors: A, B | release_date: 2023-05-01 | source: youtube
//! ```
//!
//! The list marker (`-`, `*` or `N.`) and every `| key: value` field are optional.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*]|\d+\.)?\s*\[(?P<title>[^\]]+)\]\((?P<link>[^)\s]+)\)(?P<rest>.*)$")
        .expect("metadata entry pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredMetadataEntry {
    pub index: usize,
    pub title: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataParseError {
    #[error("line {line}: expected `[title](link)`, found {found:?}")]
    NotAnEntry { line: usize, found: String },
    #[error("line {line}: malformed field {field:?}")]
    BadField { line: usize, field: String },
}

/// Parse the raw string, yielding an empty list for malformed input. The parse error is
/// logged rather than returned.
pub fn parse_metadata(raw: &str) -> Vec<StructuredMetadataEntry> {
    try_parse_metadata(raw).unwrap_or_else(|e| {
        tracing::warn!("Failed to parse formatted metadata: {}", e);
        Vec::new()
    })
}

pub fn try_parse_metadata(raw: &str) -> Result<Vec<StructuredMetadataEntry>, MetadataParseError> {
    let mut entries = Vec::new();

    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = line_no + 1;

        let caps = ENTRY_RE
            .captures(line)
            .ok_or_else(|| MetadataParseError::NotAnEntry {
                line: line_no,
                found: line.trim().to_string(),
            })?;

        let mut entry = StructuredMetadataEntry {
            index: entries.len() + 1,
            title: caps["title"].trim().to_string(),
            link: caps["link"].to_string(),
            authors: Vec::new(),
            release_date: None,
            source: None,
        };

        let rest = caps["rest"].trim();
        if !rest.is_empty() {
            let Some(rest) = rest.strip_prefix('|') else {
                return Err(MetadataParseError::BadField {
                    line: line_no,
                    field: rest.to_string(),
                });
            };
            for field in rest.split('|') {
                let field = field.trim();
                if field.is_empty() {
                    continue;
                }
                let (key, value) =
                    field
                        .split_once(':')
                        .ok_or_else(|| MetadataParseError::BadField {
                            line: line_no,
                            field: field.to_string(),
                        })?;
                let value = value.trim();
                match key.trim().to_lowercase().as_str() {
                    "authors" | "author" => {
                        entry.authors = value
                            .split(',')
                            .map(str::trim)
                            .filter(|a| !a.is_empty())
                            .map(str::to_string)
                            .collect();
                    }
                    "release_date" | "date" => entry.release_date = Some(value.to_string()),
                    "source" => entry.source = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        entries.push(entry);
    }

    Ok(entries)
}
