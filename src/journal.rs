//! Append-only text logs: the category audit log and the unsubscribe log.

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::JournalError;

/// Where a newly registered category came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// The model answered from rule keys alone.
    ModelResponse,
    /// The vocabulary offered to the model included mailbox labels.
    ModelResponseAndLabels,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelResponse => "model response",
            Self::ModelResponseAndLabels => "model response + mailbox labels",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A text file that is only ever appended to.
#[derive(Debug, Clone)]
pub struct AppendLog {
    path: PathBuf,
}

impl AppendLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `text` verbatim, creating the file and parent dirs if missing.
    pub async fn append(&self, text: &str) -> Result<(), JournalError> {
        let io_err = |source| JournalError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(text.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        Ok(())
    }
}

/// One block per newly registered category.
#[derive(Debug, Clone)]
pub struct AuditLog {
    log: AppendLog,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            log: AppendLog::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }

    pub async fn record_new_category(
        &self,
        category: &str,
        label: &str,
        provenance: Provenance,
    ) -> Result<(), JournalError> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let entry = format!(
            "\n[{timestamp}] New category detected by model:\n  \
             - Category: {category}\n  \
             - Label: {label}\n  \
             - Source: {provenance}\n"
        );
        self.log.append(&entry).await
    }
}

/// One line per attempted unsubscribe.
#[derive(Debug, Clone)]
pub struct UnsubscribeLog {
    log: AppendLog,
}

impl UnsubscribeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            log: AppendLog::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }

    pub async fn record(&self, subject: &str, target: &str) -> Result<(), JournalError> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        // keep one entry per line
        let subject = subject.replace(['\r', '\n'], " ");
        self.log
            .append(&format!("{timestamp} | {subject} | {target}\n"))
            .await
    }
}
