use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use tracing::{debug, error, info, warn};

use crate::blob::BlobStore;
use crate::domain::{DownloadOutcome, ReferenceRecord};
use crate::error::DownloaderError;
use crate::fs_util::ensure_dir;
use crate::paths::resolve_unique_path;
use crate::query::QuerySource;
use crate::rows::extract_records;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);

    /// Checked between items; the item in flight always completes.
    fn cancelled(&self) -> bool {
        false
    }
}

pub struct Downloader<Q: QuerySource, B: BlobStore> {
    query_source: Q,
    blob_store: B,
    bucket: String,
    output_dir: Utf8PathBuf,
}

impl<Q: QuerySource, B: BlobStore> Downloader<Q, B> {
    pub fn new(
        query_source: Q,
        blob_store: B,
        bucket: impl Into<String>,
        output_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            query_source,
            blob_store,
            bucket: bucket.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Fails only when no item could be attempted: the query failed, its rows
    /// lack `id`/`filename`, or the output directory cannot be created.
    /// Individual fetch failures are counted in the outcome instead.
    pub fn run(
        &self,
        query: &str,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutcome, DownloaderError> {
        info!(query, "executing query");
        sink.event(ProgressEvent::new("phase=Query; executing query"));

        let records = self.fetch_records(query).inspect_err(|err| {
            error!(error = %err, "failed to read query results");
        })?;

        if records.is_empty() {
            warn!("query returned 0 results");
            sink.event(ProgressEvent::new("phase=Done; query returned 0 results"));
            return Ok(DownloadOutcome::default());
        }

        info!(count = records.len(), "found files, starting download");
        sink.event(ProgressEvent::new(format!(
            "phase=Prepare; found {} files",
            records.len()
        )));

        ensure_dir(&self.output_dir).inspect_err(|err| {
            error!(error = %err, "failed to initialize download directory");
        })?;

        let outcome = self.download_all(&records, sink);
        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "download completed"
        );
        sink.event(ProgressEvent::new(format!(
            "phase=Done; success={} failed={}",
            outcome.succeeded, outcome.failed
        )));
        Ok(outcome)
    }

    fn fetch_records(&self, query: &str) -> Result<Vec<ReferenceRecord>, DownloaderError> {
        let rows = self.query_source.execute(query)?;
        extract_records(&rows).map_err(|err| DownloaderError::QueryResult(Box::new(err)))
    }

    fn download_all(&self, records: &[ReferenceRecord], sink: &dyn ProgressSink) -> DownloadOutcome {
        let mut outcome = DownloadOutcome::default();
        let total = records.len();

        for (index, record) in records.iter().enumerate() {
            if sink.cancelled() {
                warn!(remaining = total - index, "download cancelled");
                sink.event(ProgressEvent::new(format!(
                    "cancelled; {} items not attempted",
                    total - index
                )));
                break;
            }

            let target = resolve_unique_path(&self.output_dir, record.filename());
            debug!(id = record.id(), path = %target, "downloading");
            sink.event(ProgressEvent::new(format!(
                "phase=Fetch; [{}/{total}] {} -> {target}",
                index + 1,
                record.id()
            )));

            let start = Instant::now();
            match self.blob_store.fetch(&self.bucket, record.id(), &target) {
                Ok(()) => {
                    sink.event(ProgressEvent {
                        message: format!("item.ok id={}", record.id()),
                        elapsed: Some(start.elapsed()),
                    });
                    outcome.record_success(record, target);
                }
                Err(err) => {
                    error!(id = record.id(), error = %err, "download failed");
                    sink.event(ProgressEvent {
                        message: format!("item.failed id={} error={err}", record.id()),
                        elapsed: Some(start.elapsed()),
                    });
                    outcome.record_failure(record, Some(target), &err);
                }
            }
        }

        outcome
    }
}
