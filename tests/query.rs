use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use sqlx::{ConnectOptions, Connection};
use sqlx::sqlite::SqliteConnectOptions;

use s3_sql_downloader::error::DownloaderError;
use s3_sql_downloader::query::{QuerySource, SqliteQuerySource};
use s3_sql_downloader::rows::{RowAccess, extract_records};

fn seed_database(path: &Utf8PathBuf, statements: &[&str]) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let mut conn = SqliteConnectOptions::new()
            .filename(path.as_std_path())
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();
        for statement in statements {
            sqlx::query(*statement).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();
    });
}

fn seeded() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("app.db")).unwrap();
    seed_database(
        &path,
        &[
            "CREATE TABLE attachments (uuid TEXT, original_name TEXT, size INTEGER, ratio REAL)",
            "INSERT INTO attachments VALUES ('0b7e-1', 'contract.pdf', 1024, 0.5)",
            "INSERT INTO attachments VALUES ('0b7e-2', NULL, 2048, 1.5)",
            "INSERT INTO attachments VALUES ('0b7e-3', 'photo.jpg', 4096, 2.0)",
        ],
    );
    (temp, path)
}

#[test]
fn aliased_columns_feed_the_extractor() {
    let (_temp, path) = seeded();
    let source = SqliteQuerySource::open(path).unwrap();

    let rows = source
        .execute(
            "SELECT uuid AS id, original_name AS filename FROM attachments \
             WHERE original_name IS NOT NULL ORDER BY uuid",
        )
        .unwrap();
    let records = extract_records(&rows).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id(), "0b7e-1");
    assert_eq!(records[0].filename(), "contract.pdf");
    assert_eq!(records[1].id(), "0b7e-3");
}

#[test]
fn non_text_columns_are_rendered_as_strings() {
    let (_temp, path) = seeded();
    let source = SqliteQuerySource::open(path).unwrap();

    let rows = source
        .execute("SELECT size AS id, original_name AS filename, ratio FROM attachments ORDER BY size")
        .unwrap();

    assert_eq!(rows[0].string_field("id"), Some("1024"));
    assert_eq!(rows[0].string_field("ratio"), Some("0.5"));
    assert_eq!(rows[1].string_field("filename"), None);
    assert_eq!(rows[2].string_field("ratio"), Some("2.0"));
}

#[test]
fn real_values_match_sqlite_text_conversion() {
    let (_temp, path) = seeded();
    let source = SqliteQuerySource::open(path).unwrap();

    let rows = source
        .execute("SELECT ratio AS id, CAST(ratio AS TEXT) AS filename FROM attachments ORDER BY ratio")
        .unwrap();

    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(row.string_field("id"), row.string_field("filename"));
    }
    assert_eq!(rows[2].string_field("id"), Some("2.0"));
}

#[test]
fn null_filename_fails_extraction() {
    let (_temp, path) = seeded();
    let source = SqliteQuerySource::open(path).unwrap();

    let rows = source
        .execute("SELECT uuid AS id, original_name AS filename FROM attachments ORDER BY uuid")
        .unwrap();
    let err = extract_records(&rows).unwrap_err();
    assert_matches!(err, DownloaderError::MissingColumn { column: "filename", row: 1 });
}

#[test]
fn database_is_opened_read_only() {
    let (_temp, path) = seeded();
    let source = SqliteQuerySource::open(path).unwrap();

    let err = source
        .execute("DELETE FROM attachments")
        .unwrap_err();
    assert_matches!(err, DownloaderError::QueryExecution(_));

    let rows = source.execute("SELECT uuid AS id FROM attachments").unwrap();
    assert_eq!(rows.len(), 3);
}

#[test]
fn malformed_sql_is_an_execution_error() {
    let (_temp, path) = seeded();
    let source = SqliteQuerySource::open(path).unwrap();
    let err = source.execute("SELECT FROM nowhere").unwrap_err();
    assert_matches!(err, DownloaderError::QueryExecution(_));
}

#[test]
fn missing_database_file_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("absent.db")).unwrap();
    let result = SqliteQuerySource::open(path);
    assert_matches!(result, Err(DownloaderError::QueryExecution(_)));
}
