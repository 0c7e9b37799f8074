use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::IngestError;

pub const DEFAULT_MAX_CHUNK_CHARS: usize = 500;
pub const DEFAULT_SEARCH_LIMIT: usize = 5;
pub const DEFAULT_AUGMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// A persisted document: its extracted text, the chunks derived from it at
/// ingestion time, and a pointer to the original uploaded bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub category: String,
    pub content: String,
    pub chunks: Vec<String>,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub checksum: String,
}

impl DocumentRecord {
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            filename: self.filename.clone(),
            category: self.category.clone(),
            chunks: self.chunks.clone(),
            created_at: self.created_at,
        }
    }
}

/// The list view of a record. Content and storage location stay server side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub category: String,
    pub chunks: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub media_type: String,
    pub category: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub id: String,
    pub filename: String,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub limit: usize,
    pub category: Option<String>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: DEFAULT_SEARCH_LIMIT,
            category: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Lowercased query words longer than two characters.
    pub fn terms(&self) -> Vec<String> {
        self.text
            .split_whitespace()
            .map(|token| token.to_lowercase())
            .filter(|token| token.chars().count() > 2)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub content: String,
    pub filename: String,
    pub category: String,
    pub score: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub sources: Vec<String>,
    pub answer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct KnowledgeOptions {
    pub data_dir: PathBuf,
    pub max_chunk_chars: usize,
}

impl KnowledgeOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn documents_path(&self) -> PathBuf {
        self.data_dir.join("documents.json")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chunk_chars == 0 {
            return Err(IngestError::InvalidArgument(
                "max chunk size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for KnowledgeOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AugmenterConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl AugmenterConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout: DEFAULT_AUGMENT_TIMEOUT,
        }
    }
}
