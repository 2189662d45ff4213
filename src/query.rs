use camino::Utf8PathBuf;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Row};
use tokio::runtime::Runtime;

use crate::error::DownloaderError;
use crate::rows::QueryRow;

pub trait QuerySource: Send + Sync {
    fn execute(&self, query: &str) -> Result<Vec<QueryRow>, DownloaderError>;
}

/// Read-only SQLite database driven through sqlx on a private runtime.
#[derive(Debug)]
pub struct SqliteQuerySource {
    path: Utf8PathBuf,
    runtime: Runtime,
}

impl SqliteQuerySource {
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self, DownloaderError> {
        let path = path.into();
        if !path.as_std_path().is_file() {
            return Err(DownloaderError::QueryExecution(format!(
                "database not found: {path}"
            )));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| DownloaderError::QueryExecution(err.to_string()))?;
        Ok(Self { path, runtime })
    }
}

impl QuerySource for SqliteQuerySource {
    fn execute(&self, query: &str) -> Result<Vec<QueryRow>, DownloaderError> {
        let options = SqliteConnectOptions::new()
            .filename(self.path.as_std_path())
            .read_only(true);

        self.runtime.block_on(async {
            let mut conn = options
                .connect()
                .await
                .map_err(|err| DownloaderError::QueryExecution(err.to_string()))?;
            let rows = sqlx::query(query)
                .fetch_all(&mut conn)
                .await
                .map_err(|err| DownloaderError::QueryExecution(err.to_string()))?;
            rows.iter().map(to_query_row).collect()
        })
    }
}

fn to_query_row(row: &SqliteRow) -> Result<QueryRow, DownloaderError> {
    let mut out = QueryRow::new();
    for column in row.columns() {
        let index = column.ordinal();
        out.push(column.name(), column_as_string(row, index)?);
    }
    Ok(out)
}

/// Renders a column the way `CAST(x AS TEXT)` would, so REAL `2.0` stays
/// `"2.0"`. Blobs that are not UTF-8 are decoded lossily.
fn column_as_string(row: &SqliteRow, index: usize) -> Result<Option<String>, DownloaderError> {
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return Ok(value);
    }
    // Skipping the type check makes SQLite convert INTEGER and REAL itself.
    if let Ok(value) = row.try_get_unchecked::<Option<String>, _>(index) {
        return Ok(value);
    }
    row.try_get::<Option<Vec<u8>>, _>(index)
        .map(|value| value.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
        .map_err(|err| DownloaderError::QueryExecution(err.to_string()))
}
