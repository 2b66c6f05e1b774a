//! Line-oriented chat log: `time,user,comment` per record.
//!
//! Lines are appended as batches arrive, into a `.part` file next to the
//! target. Finalizing removes exact duplicate lines and moves the file into
//! place; a log that is never finalized is deleted on drop.

use crate::io::sink::{ChatSink, SinkError, SinkSummary};
use crate::models::ChatMessage;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const FLAT_LOG_HEADER: &str = "time,user,comment";

/// Keep the first occurrence of every line, preserving order.
pub fn remove_duplicate_lines<S: AsRef<str>>(lines: &[S]) -> Vec<&str> {
    let mut seen = HashSet::new();
    lines
        .iter()
        .map(|line| AsRef::<str>::as_ref(line))
        .filter(|line| seen.insert(*line))
        .collect()
}

/// Rewrite `path` without exact duplicate lines; returns how many were removed.
///
/// Lines are compared including their terminator, so a final line without
/// a trailing newline is distinct from the same text earlier in the file.
pub fn dedup_file(path: &Path) -> std::io::Result<u64> {
    let content = fs::read_to_string(path)?;
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let unique = remove_duplicate_lines(&lines);
    let removed = (lines.len() - unique.len()) as u64;

    if removed > 0 {
        fs::write(path, unique.concat())?;
    }
    Ok(removed)
}

/// One field of a log line: line breaks become spaces, and a field holding
/// a comma or quote is quoted with inner quotes doubled.
fn csv_field(value: &str) -> Cow<'_, str> {
    let value = if value.contains(['\n', '\r']) {
        Cow::Owned(value.replace(['\r', '\n'], " "))
    } else {
        Cow::Borrowed(value)
    };
    if value.contains([',', '"']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        value
    }
}

fn csv_line(message: &ChatMessage) -> String {
    format!(
        "{},{},{}\n",
        csv_field(&message.time_text),
        csv_field(&message.author),
        csv_field(&message.message)
    )
}

pub struct FlatLogSink {
    target: PathBuf,
    part: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl FlatLogSink {
    /// Create the log for `target`, writing the header immediately.
    pub fn create(target: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let target = target.into();
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut part = target.clone().into_os_string();
        part.push(".part");
        let part = PathBuf::from(part);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&part)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", FLAT_LOG_HEADER)?;

        tracing::debug!("📝 Writing chat log to {}", part.display());
        Ok(Self {
            target,
            part,
            writer: Some(writer),
            written: 0,
        })
    }
}

impl ChatSink for FlatLogSink {
    fn append(&mut self, batch: &[ChatMessage]) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Finalized)?;
        for message in batch {
            writer.write_all(csv_line(message).as_bytes())?;
        }
        writer.flush()?;
        self.written += batch.len() as u64;
        Ok(())
    }

    fn finalize(&mut self) -> Result<SinkSummary, SinkError> {
        let mut writer = self.writer.take().ok_or(SinkError::Finalized)?;
        writer.flush()?;
        drop(writer);

        let duplicates_removed = dedup_file(&self.part)?;
        if duplicates_removed > 0 {
            tracing::info!("🧽 Removed {} duplicate lines", duplicates_removed);
        }
        fs::rename(&self.part, &self.target)?;

        tracing::info!(
            "✅ Saved {} chat lines to {}",
            self.written - duplicates_removed,
            self.target.display()
        );
        Ok(SinkSummary {
            messages_written: self.written - duplicates_removed,
            duplicates_removed,
            path: Some(self.target.clone()),
            skipped: false,
        })
    }
}

impl Drop for FlatLogSink {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            if let Err(e) = fs::remove_file(&self.part) {
                tracing::warn!("⚠️ Failed to remove {}: {}", self.part.display(), e);
            }
        }
    }
}
