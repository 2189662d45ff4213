use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::Serialize;

use crate::error::DownloaderError;

static SELECT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*select\b").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRecord {
    id: String,
    filename: String,
}

impl ReferenceRecord {
    pub fn new(id: impl Into<String>, filename: impl Into<String>) -> Result<Self, DownloaderError> {
        let id = id.into();
        let filename = filename.into();
        if id.trim().is_empty() {
            return Err(DownloaderError::InvalidRecord { field: "id" });
        }
        if filename.trim().is_empty() {
            return Err(DownloaderError::InvalidRecord { field: "filename" });
        }
        Ok(Self { id, filename })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}

/// A statement the entry surface accepts: non-blank and starting with SELECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery(String);

impl SelectQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SelectQuery {
    type Err = DownloaderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DownloaderError::EmptyQuery);
        }
        if !SELECT_PREFIX.is_match(trimmed) {
            return Err(DownloaderError::NotReadOnly(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Downloaded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    pub id: String,
    pub filename: String,
    pub status: ItemStatus,
    pub path: Option<Utf8PathBuf>,
    pub error: Option<String>,
}

/// Tally of one run. Item failures land here, never in the run's error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<ItemResult>,
}

impl DownloadOutcome {
    pub fn record_success(&mut self, record: &ReferenceRecord, path: Utf8PathBuf) {
        self.succeeded += 1;
        self.items.push(ItemResult {
            id: record.id().to_string(),
            filename: record.filename().to_string(),
            status: ItemStatus::Downloaded,
            path: Some(path),
            error: None,
        });
    }

    pub fn record_failure(
        &mut self,
        record: &ReferenceRecord,
        path: Option<Utf8PathBuf>,
        error: &DownloaderError,
    ) {
        self.failed += 1;
        self.items.push(ItemResult {
            id: record.id().to_string(),
            filename: record.filename().to_string(),
            status: ItemStatus::Failed,
            path,
            error: Some(error.to_string()),
        });
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}
