//! Append-only error journal
//!
//! One line per failure: `[YYYY-MM-DD HH:MM:SS.mmm] ERROR: message`, local
//! time. Every entry is mirrored to the operator log via `tracing`.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Error sink shared by all connections
pub struct Journal {
    path: PathBuf,
    /// Serializes appends from concurrent connections
    write_lock: Mutex<()>,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a failure
    ///
    /// A journal that cannot be written is reported to the operator log and
    /// otherwise ignored; it never fails the connection.
    pub async fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref().replace(['\n', '\r'], " ");
        tracing::error!("{}", message);

        let line = format!("[{}] ERROR: {}\n", timestamp(), message);
        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.append(&line).await {
            tracing::warn!("Failed to write journal {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}
