//! FAQ catalog: the ordered question/answer pairs the engine answers from.
//!
//! A catalog file is a JSON array of objects, each with a `question` and an
//! `answer` string. Extra fields are ignored. The position of an entry in the
//! array is its identity: the similarity index stores vectors in the same
//! order, so a search hit's index is a catalog index.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::error::{MatchError, Result};

/// One question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Canonical phrasing of the question.
    pub question: String,

    /// Canned answer returned when a query matches `question`.
    pub answer: String,
}

impl CatalogEntry {
    /// Create a new entry.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// An ordered, validated set of catalog entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Build a catalog from entries, rejecting blank questions or answers.
    ///
    /// An empty list is accepted here; loading from a source and
    /// initializing an engine both reject it.
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self> {
        for (index, entry) in entries.iter().enumerate() {
            if entry.question.trim().is_empty() {
                return Err(MatchError::CatalogShape {
                    index,
                    reason: "question is blank".to_string(),
                });
            }
            if entry.answer.trim().is_empty() {
                return Err(MatchError::CatalogShape {
                    index,
                    reason: "answer is blank".to_string(),
                });
            }
        }

        Ok(Self { entries })
    }

    /// Parse a catalog from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Vec<serde_json::Value> = serde_json::from_str(json)?;

        let entries = raw
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                serde_json::from_value::<CatalogEntry>(value).map_err(|e| {
                    MatchError::CatalogShape {
                        index,
                        reason: e.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if entries.is_empty() {
            return Err(MatchError::EmptyCatalog);
        }

        Self::new(entries)
    }

    /// Load a catalog from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| MatchError::CatalogRead {
                path: path.to_path_buf(),
                source,
            })?;

        let catalog = Self::from_json(&content)?;
        info!("Loaded {} FAQs from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the catalog has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at a catalog position.
    pub fn get(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    /// All entries in catalog order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Questions in catalog order.
    pub fn questions(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.question.as_str())
    }

    /// Answers in catalog order.
    pub fn answers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.answer.as_str())
    }
}
