//! JSON persistence of structured queries.
//!
//! The stored document carries the SQL text next to the structure and a
//! status telling the loader which of the two is authoritative.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::parser::parse_select;
use super::StructuredQuery;

pub const FORMAT_VERSION: u32 = 1;

/// How much of the SQL text the structure represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// Only the text was stored; parse it on load.
    #[default]
    NotParsed,
    Structured,
    /// Structured, with some nodes kept as raw text.
    Partial,
    /// The text could not be structured; it is used as is.
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedQuery {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub status: ParseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default)]
    pub query: StructuredQuery,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

impl PersistedQuery {
    pub fn new(query: StructuredQuery, status: ParseStatus, sql: Option<String>) -> Self {
        Self {
            version: FORMAT_VERSION,
            status,
            sql,
            query,
        }
    }

    /// Store a model, keeping its generic rendering as the text form.
    pub fn from_query(query: &StructuredQuery) -> Self {
        let status = if query.is_raw_only() {
            ParseStatus::Failed
        } else {
            ParseStatus::Structured
        };
        Self::new(query.clone(), status, Some(query.render()))
    }

    /// Store SQL text to be parsed when loaded.
    pub fn from_sql(sql: impl Into<String>) -> Self {
        Self::new(StructuredQuery::new(), ParseStatus::NotParsed, Some(sql.into()))
    }

    /// Rebuild the model from whichever representation is authoritative.
    pub fn into_query(self) -> StructuredQuery {
        match self.status {
            ParseStatus::Structured | ParseStatus::Partial => self.query,
            ParseStatus::NotParsed => {
                let Some(sql) = self.sql else {
                    return self.query;
                };
                match parse_select(&sql) {
                    Ok(outcome) => outcome.query,
                    Err(e) => {
                        tracing::warn!(error = %e, "stored sql did not parse, using raw text");
                        StructuredQuery::from_raw(sql)
                    }
                }
            }
            ParseStatus::Failed => match self.sql {
                Some(sql) => StructuredQuery::from_raw(sql),
                None => self.query,
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize query")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse stored query")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&content)
    }
}
