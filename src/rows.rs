//! Turns query result rows into download work items.

use crate::domain::ReferenceRecord;
use crate::error::DownloaderError;

pub const ID_COLUMN: &str = "id";
pub const FILENAME_COLUMN: &str = "filename";

pub trait RowAccess {
    /// `None` when the column is absent or NULL.
    fn string_field(&self, name: &str) -> Option<&str>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRow {
    columns: Vec<(String, Option<String>)>,
}

impl QueryRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Option<String>) {
        self.columns.push((name.into(), value));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, Some(value.into()));
        self
    }
}

impl RowAccess for QueryRow {
    fn string_field(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .and_then(|(_, value)| value.as_deref())
    }
}

/// Extracts one record per row, in row order.
///
/// A single row without a usable `id` or `filename` fails the whole batch:
/// that is a schema mismatch, not a bad row.
pub fn extract_records<R: RowAccess>(rows: &[R]) -> Result<Vec<ReferenceRecord>, DownloaderError> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let id = required_field(row, ID_COLUMN, index)?;
            let filename = required_field(row, FILENAME_COLUMN, index)?;
            ReferenceRecord::new(id, filename)
        })
        .collect()
}

fn required_field<'a, R: RowAccess>(
    row: &'a R,
    column: &'static str,
    index: usize,
) -> Result<&'a str, DownloaderError> {
    row.string_field(column)
        .filter(|value| !value.trim().is_empty())
        .ok_or(DownloaderError::MissingColumn { column, row: index })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn reads_fields_by_name_not_position() {
        let row = QueryRow::new()
            .with("filename", "report.csv")
            .with("size", "12")
            .with("id", "k-1");
        let records = extract_records(&[row]).unwrap();
        assert_eq!(records[0].id(), "k-1");
        assert_eq!(records[0].filename(), "report.csv");
    }

    #[test]
    fn null_column_counts_as_missing() {
        let mut row = QueryRow::new().with("id", "k-1");
        row.push("filename", None);
        let err = extract_records(&[row]).unwrap_err();
        assert_matches!(
            err,
            DownloaderError::MissingColumn {
                column: "filename",
                row: 0
            }
        );
    }
}
