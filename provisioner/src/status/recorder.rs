//! Status file recorder
//!
//! Keeps the single current [`StatusRecord`] of the process and mirrors every
//! change to a well-known JSON file that external monitors poll. Each write
//! replaces the file atomically, so a reader sees either the previous or the
//! new document and never a truncated one. The file is a mailbox: the newest
//! write wins and concurrent writers are not coordinated.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::errors::ProvisionError;
use crate::filesys::file::{File, MODE_WORLD_READ};
use crate::status::phase::{Phase, StatusRecord};

/// Default location of the status file
pub const DEFAULT_STATUS_FILE: &str = "/var/run/greengrass-provisioning.status";

/// Persists the current provisioning status
#[derive(Debug)]
pub struct StatusRecorder {
    file: File,
    current: StatusRecord,
}

impl StatusRecorder {
    /// Create a recorder and write the initial `STARTING` record. The parent
    /// directory of `path` is created when missing. A failed initial write is
    /// logged and the recorder is still returned; later reports retry it.
    pub async fn new(path: impl Into<PathBuf>) -> Self {
        let recorder = Self {
            file: File::new(path),
            current: StatusRecord::starting(),
        };
        if recorder.flush().await.is_err() {
            warn!("Continuing without initial status record");
        }
        recorder
    }

    /// Path of the status file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Current status
    pub fn current(&self) -> &StatusRecord {
        &self.current
    }

    /// Move to `phase`. An empty `message` selects the phase's default message
    /// and a missing `progress` the phase's default progress; an explicit
    /// progress is clamped to `0..=100`. Any previous error detail is cleared.
    ///
    /// `Phase::Error` has no default message, so reporting it with an empty
    /// message is rejected; use [`StatusRecorder::report_error`] instead.
    pub async fn report(
        &mut self,
        phase: Phase,
        message: &str,
        progress: Option<i32>,
    ) -> Result<(), ProvisionError> {
        let message = if message.is_empty() {
            phase.default_message().ok_or_else(|| {
                ProvisionError::StatusError(format!("{} requires a message", phase))
            })?
        } else {
            message
        };

        self.current.phase = phase;
        self.current.message = message.to_string();
        self.current.timestamp = Utc::now();
        match progress {
            Some(p) => self.current.progress_percent = p.clamp(0, 100) as u8,
            None => {
                if let Some(p) = phase.default_progress() {
                    self.current.progress_percent = p;
                }
            }
        }
        if phase != Phase::Error {
            self.current.error_detail = None;
        }

        self.flush().await?;
        info!("Status updated: {} - {}", phase, self.current.message);
        Ok(())
    }

    /// Move to `ERROR` with a message and detail. Progress is left untouched so
    /// monitors can see how far the run got. An empty detail is omitted from
    /// the file entirely.
    pub async fn report_error(&mut self, message: &str, detail: &str) -> Result<(), ProvisionError> {
        self.current.phase = Phase::Error;
        self.current.message = message.to_string();
        self.current.error_detail = if detail.is_empty() {
            None
        } else {
            Some(detail.to_string())
        };
        self.current.timestamp = Utc::now();

        self.flush().await?;
        error!("Error reported: {} - {}", message, detail);
        Ok(())
    }

    async fn flush(&self) -> Result<(), ProvisionError> {
        let result = self
            .file
            .write_json_with_mode(&self.current, MODE_WORLD_READ)
            .await;

        if let Err(e) = &result {
            error!(
                "Failed to write status file {}: {}",
                self.file.path().display(),
                e
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_json(path: &Path) -> serde_json::Value {
        let raw = tokio::fs::read_to_string(path).await.unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_initial_record_is_written() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("status.json");
        let recorder = StatusRecorder::new(&path).await;

        let json = read_json(&path).await;
        assert_eq!(json["status"], "STARTING");
        assert_eq!(json["message"], "Service is starting");
        assert_eq!(json["progress_percentage"], 0);
        assert_eq!(recorder.current().phase, Phase::Starting);
    }

    #[tokio::test]
    async fn test_default_progress_used_when_absent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut recorder = StatusRecorder::new(tmp.path().join("s")).await;

        recorder
            .report(Phase::ReadingDatabase, "", None)
            .await
            .unwrap();
        assert_eq!(recorder.current().progress_percent, 40);
    }

    #[tokio::test]
    async fn test_error_without_message_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut recorder = StatusRecorder::new(tmp.path().join("s")).await;

        let err = recorder.report(Phase::Error, "", None).await.unwrap_err();
        assert!(matches!(err, ProvisionError::StatusError(_)));
        assert_eq!(recorder.current().phase, Phase::Starting);
    }

    #[tokio::test]
    async fn test_error_keeps_progress_and_next_report_clears_detail() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("s");
        let mut recorder = StatusRecorder::new(&path).await;

        recorder
            .report(Phase::GeneratingConfig, "", Some(60))
            .await
            .unwrap();
        recorder.report_error("boom", "disk full").await.unwrap();
        assert_eq!(recorder.current().progress_percent, 60);
        assert_eq!(read_json(&path).await["error_details"], "disk full");

        recorder.report(Phase::Provisioning, "", None).await.unwrap();
        assert!(read_json(&path).await.get("error_details").is_none());
    }

    #[tokio::test]
    async fn test_unwritable_path_still_yields_recorder() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "regular file").unwrap();

        let mut recorder = StatusRecorder::new(blocker.join("status")).await;
        assert_eq!(recorder.current().phase, Phase::Starting);

        assert!(recorder
            .report(Phase::CheckingProvisioning, "", None)
            .await
            .is_err());
        assert_eq!(recorder.current().phase, Phase::CheckingProvisioning);
    }
}
