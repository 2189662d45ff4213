use std::io::{self, Write};

use serde::Serialize;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::domain::DownloadOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

impl OutputMode {
    /// The interactive view owns the terminal; item errors show in its log pane.
    pub fn logs_to_stderr(self) -> bool {
        matches!(self, OutputMode::NonInteractive)
    }

    pub fn log_writer(self) -> BoxMakeWriter {
        if self.logs_to_stderr() {
            BoxMakeWriter::new(io::stderr)
        } else {
            BoxMakeWriter::new(io::sink)
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_outcome(outcome: &DownloadOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_non_interactive_runs_log_to_stderr() {
        assert!(OutputMode::NonInteractive.logs_to_stderr());
        assert!(!OutputMode::Interactive.logs_to_stderr());
    }
}
