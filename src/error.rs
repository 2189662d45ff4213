use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DownloaderError {
    #[error("query cannot be empty")]
    EmptyQuery,

    #[error("only SELECT queries are allowed: {0}")]
    #[diagnostic(help("the query is executed as-is; start it with SELECT"))]
    NotReadOnly(String),

    #[error("invalid reference record: {field} is empty")]
    InvalidRecord { field: &'static str },

    #[error("result row {row} is missing required column '{column}'")]
    MissingColumn { column: &'static str, row: usize },

    #[error("query executed but its rows do not match the expected shape")]
    #[diagnostic(help("alias the selected columns as 'id' and 'filename'"))]
    QueryResult(#[source] Box<DownloaderError>),

    #[error("query execution failed: {0}")]
    QueryExecution(String),

    #[error("failed to create download directory {path}: {message}")]
    DirectoryInit { path: Utf8PathBuf, message: String },

    #[error("object not found: {bucket}/{key}")]
    BlobNotFound { bucket: String, key: String },

    #[error("access denied to object {bucket}/{key}: {message}")]
    BlobAccessDenied {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("blob store returned status {status}: {message}")]
    BlobStatus { status: u16, message: String },

    #[error("object key cannot be addressed in a request path: {bucket}/{key}")]
    UnaddressableKey { bucket: String, key: String },

    #[error("blob store request failed: {0}")]
    BlobHttp(String),

    #[error("invalid blob store endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("no bucket configured")]
    #[diagnostic(help("set \"bucket\" in s3sql.json, S3SQL_BUCKET, or pass --bucket"))]
    MissingBucket,

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl DownloaderError {
    /// True for the errors that abort a whole run before any item is attempted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DownloaderError::QueryResult(_)
                | DownloaderError::QueryExecution(_)
                | DownloaderError::DirectoryInit { .. }
        )
    }
}
