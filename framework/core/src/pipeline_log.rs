use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ChaosResult;

/// Append-only audit log shared by every stage of a run.
///
/// Each entry is one line prefixed with a UTC timestamp and the stage that wrote it. A disabled
/// log accepts entries and drops them, which keeps the single fault commands free of run
/// directories.
#[derive(Debug, Clone, Default)]
pub struct PipelineLog {
    sink: Option<Arc<LogSink>>,
}

#[derive(Debug)]
struct LogSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl PipelineLog {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> ChaosResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            sink: Some(Arc::new(LogSink {
                path,
                file: Mutex::new(file),
            })),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|sink| sink.path.as_path())
    }

    pub fn record(&self, stage: &str, message: impl Display) {
        let Some(sink) = &self.sink else {
            return;
        };
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let mut file = sink.file.lock();
        for line in message.to_string().lines() {
            if let Err(e) = writeln!(file, "{timestamp} [{stage}] {line}") {
                log::warn!("Failed to write to {}: {e}", sink.path.display());
                return;
            }
        }
    }

    /// Record the exit status and captured output of a collaborator process.
    pub fn record_output(&self, stage: &str, command: &str, output: &Output) {
        self.record(stage, format_args!("$ {command} ({})", output.status));
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            self.record(&format!("{stage}:stdout"), stdout.trim_end());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            self.record(&format!("{stage}:stderr"), stderr.trim_end());
        }
    }
}
