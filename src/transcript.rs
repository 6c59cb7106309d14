//! Append-only transcript logging.
//!
//! Each exchange is appended to one file per calendar day under the log
//! directory, one `[timestamp] role: text` line per entry. Files are
//! opened and closed per write; no handle is held across turns.

use anyhow::{Context, Result};
use chrono::Local;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// Writer for the daily transcript files.
pub struct Transcript {
    dir: PathBuf,
}

impl Transcript {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Append one role-tagged line to today's file, creating the log
    /// directory and the file on demand.
    pub fn append(&self, role: &str, text: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create log directory: {}", self.dir.display()))?;

        let now = Local::now();
        let path = self.dir.join(format!("{}.log", now.format("%Y-%m-%d")));
        let line = format_entry(&now.to_rfc3339(), role, text);

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to write log file: {}", path.display()))?;

        debug!("Logged {} entry to {}", role, path.display());
        Ok(())
    }

    /// Log one question/answer pair.
    pub fn log_exchange(&self, question: &str, answer: &str) -> Result<()> {
        self.append("user", question)?;
        self.append("assistant", answer)
    }
}

fn format_entry(timestamp: &str, role: &str, text: &str) -> String {
    format!("[{}] {}: {}\n", timestamp, role, text)
}
