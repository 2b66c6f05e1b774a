//! Interchange records into the chat store.
//!
//! Each video is imported as one transaction. Incremental mode never
//! touches a video that is already stored; overwrite mode replaces its
//! message set wholesale. Batches isolate failures per source.

use super::crud::{delete_messages, insert_messages, upsert_video, video_exists, video_message_count};
use super::ChatDatabase;
use crate::cancel::CancelFlag;
use crate::io::error::LiveChatError;
use crate::io::interchange::load_record;
use crate::io::sink::{ChatSink, SinkError, SinkSummary};
use crate::models::{ChatMessage, ChatReplayRecord, ImportStatistics, VideoInfo};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, derive_more::Display)]
pub enum ImportMode {
    /// Skip videos that are already stored
    #[display("incremental")]
    Incremental,
    /// Replace the stored message set of each video
    #[default]
    #[display("overwrite")]
    Overwrite,
}

impl ImportMode {
    pub fn from_incremental(incremental: bool) -> Self {
        if incremental {
            Self::Incremental
        } else {
            Self::Overwrite
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// `rejected` counts records dropped for an empty author or message
    Imported { messages: u64, rejected: u64 },
    Skipped { existing_messages: u64 },
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid interchange file: {0}")]
    Parse(LiveChatError),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl From<LiveChatError> for ImportError {
    fn from(error: LiveChatError) -> Self {
        match error {
            LiveChatError::Io(e) => Self::Io(e),
            other => Self::Parse(other),
        }
    }
}

/// One unit of a batch import.
#[derive(Debug, Clone)]
pub enum ImportSource {
    File(PathBuf),
    Record(Box<ChatReplayRecord>),
}

impl ImportSource {
    pub fn label(&self) -> String {
        match self {
            Self::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Record(record) => record.video_info.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub total_messages: u64,
    pub rejected_messages: u64,
    pub failures: Vec<SourceFailure>,
    /// Stopped by a cancel request before every source was processed
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn total(&self) -> u64 {
        self.succeeded + self.skipped + self.failed
    }

    pub fn record(&mut self, outcome: ImportOutcome) {
        match outcome {
            ImportOutcome::Imported { messages, rejected } => {
                self.succeeded += 1;
                self.total_messages += messages;
                self.rejected_messages += rejected;
            }
            ImportOutcome::Skipped { .. } => self.skipped += 1,
        }
    }

    pub fn record_failure(&mut self, source: String, error: &dyn std::fmt::Display) {
        self.failed += 1;
        self.failures.push(SourceFailure {
            source,
            error: error.to_string(),
        });
    }
}

/// Import one video's records.
///
/// Statistics are recomputed from `messages` rather than trusted from the
/// source.
pub fn import_messages(
    db: &mut ChatDatabase,
    video: &VideoInfo,
    messages: &[ChatMessage],
    mode: ImportMode,
) -> Result<ImportOutcome, ImportError> {
    if mode == ImportMode::Incremental && video_exists(&db.connection, &video.id)? {
        let existing_messages = video_message_count(&db.connection, &video.id)?;
        tracing::info!(
            "⏭️ Skipping {} ({} messages already stored)",
            video.id,
            existing_messages
        );
        return Ok(ImportOutcome::Skipped { existing_messages });
    }

    let (valid, rejected) = valid_messages(messages);
    if rejected > 0 {
        tracing::warn!(
            "⚠️ Dropping {} records of {} with an empty author or message",
            rejected,
            video.id
        );
    }
    let statistics = ImportStatistics::from_messages(&valid);

    let tx = db.connection.transaction()?;
    let replaced = delete_messages(&tx, &video.id)?;
    upsert_video(&tx, video, &statistics)?;
    let inserted = insert_messages(&tx, &video.id, &valid)?;
    tx.commit()?;

    if replaced > 0 {
        tracing::debug!("🗑️ Replaced {} stored messages of {}", replaced, video.id);
    }
    tracing::info!(
        "✅ Imported {} - {} ({} messages)",
        video.id,
        if video.title.is_empty() { "Unknown" } else { video.title.as_str() },
        inserted
    );
    Ok(ImportOutcome::Imported {
        messages: inserted,
        rejected,
    })
}

/// Records with a non-blank author and message, plus how many were not.
fn valid_messages(messages: &[ChatMessage]) -> (Vec<ChatMessage>, u64) {
    let valid: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| !m.author.trim().is_empty() && !m.message.trim().is_empty())
        .cloned()
        .collect();
    let rejected = (messages.len() - valid.len()) as u64;
    (valid, rejected)
}

pub fn import_record(
    db: &mut ChatDatabase,
    record: &ChatReplayRecord,
    mode: ImportMode,
) -> Result<ImportOutcome, ImportError> {
    import_messages(db, &record.video_info, &record.messages, mode)
}

fn import_source(
    db: &mut ChatDatabase,
    source: &ImportSource,
    mode: ImportMode,
) -> Result<ImportOutcome, ImportError> {
    match source {
        ImportSource::File(path) => {
            let record = load_record(path)?;
            import_record(db, &record, mode)
        }
        ImportSource::Record(record) => import_record(db, record, mode),
    }
}

/// Import every source in order; a failing source is counted and skipped.
///
/// `cancel` is checked between sources, never inside one.
pub fn import_batch<I>(
    db: &mut ChatDatabase,
    sources: I,
    mode: ImportMode,
    cancel: &CancelFlag,
) -> BatchSummary
where
    I: IntoIterator<Item = ImportSource>,
{
    let sources: Vec<ImportSource> = sources.into_iter().collect();
    let mut summary = BatchSummary::default();

    for (index, source) in sources.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::warn!(
                "🛑 Import cancelled, {} sources left",
                sources.len() - index
            );
            summary.cancelled = true;
            break;
        }
        let label = source.label();
        tracing::info!("[{}/{}] Importing {}", index + 1, sources.len(), label);

        match import_source(db, source, mode) {
            Ok(outcome) => summary.record(outcome),
            Err(e) => {
                tracing::error!("❌ Import of {} failed: {}", label, e);
                summary.record_failure(label, &e);
            }
        }
    }

    tracing::info!(
        succeeded = summary.succeeded,
        skipped = summary.skipped,
        failed = summary.failed,
        total_messages = summary.total_messages,
        "📊 Import finished"
    );
    summary
}

/// `*.json` files of `dir`, in file-name order.
pub fn interchange_files(dir: &Path) -> Result<Vec<PathBuf>, ImportError> {
    let pattern = format!("{}/*.json", glob::Pattern::escape(&dir.to_string_lossy()));
    tracing::trace!("Scanning {}", pattern);

    let mut files: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(|entry| match entry {
            Ok(path) if path.is_file() => Some(path),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("⚠️ Unreadable entry: {}", e);
                None
            }
        })
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Import the interchange files of a directory.
pub fn import_directory(
    db: &mut ChatDatabase,
    dir: &Path,
    mode: ImportMode,
    cancel: &CancelFlag,
) -> Result<BatchSummary, ImportError> {
    if !dir.is_dir() {
        tracing::warn!("⚠️ Directory not found: {}", dir.display());
        return Ok(BatchSummary::default());
    }

    let files = interchange_files(dir)?;
    if files.is_empty() {
        tracing::warn!("⚠️ No JSON files in {}", dir.display());
        return Ok(BatchSummary::default());
    }

    tracing::info!(
        "📂 Found {} JSON files in {} (mode: {})",
        files.len(),
        dir.display(),
        mode
    );
    Ok(import_batch(
        db,
        files.into_iter().map(ImportSource::File),
        mode,
        cancel,
    ))
}

/// Buffers a video and imports it in one transaction on finalize.
pub struct DatabaseSink<'a> {
    db: &'a mut ChatDatabase,
    video: VideoInfo,
    mode: ImportMode,
    messages: Vec<ChatMessage>,
    finalized: bool,
}

impl<'a> DatabaseSink<'a> {
    pub fn new(db: &'a mut ChatDatabase, video: VideoInfo, mode: ImportMode) -> Self {
        Self {
            db,
            video,
            mode,
            messages: Vec::new(),
            finalized: false,
        }
    }
}

impl ChatSink for DatabaseSink<'_> {
    fn append(&mut self, batch: &[ChatMessage]) -> Result<(), SinkError> {
        if self.finalized {
            return Err(SinkError::Finalized);
        }
        self.messages.extend_from_slice(batch);
        Ok(())
    }

    fn finalize(&mut self) -> Result<SinkSummary, SinkError> {
        if self.finalized {
            return Err(SinkError::Finalized);
        }
        self.finalized = true;

        let messages = std::mem::take(&mut self.messages);
        let outcome = import_messages(self.db, &self.video, &messages, self.mode)
            .map_err(|e| SinkError::Import(e.to_string()))?;

        Ok(match outcome {
            ImportOutcome::Imported { messages, .. } => SinkSummary {
                messages_written: messages,
                path: self.db.path().map(Path::to_path_buf),
                ..SinkSummary::default()
            },
            ImportOutcome::Skipped { .. } => SinkSummary {
                skipped: true,
                path: self.db.path().map(Path::to_path_buf),
                ..SinkSummary::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, texts: &[&str]) -> ChatReplayRecord {
        let messages = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                ChatMessage::new(format!("user{i}"), format!("UC_{i}"), *text, i as i64 * 1_000)
            })
            .collect();
        ChatReplayRecord::new(VideoInfo::new(id, ""), messages)
    }

    #[test]
    fn test_incremental_skips_existing_video() {
        let mut db = ChatDatabase::new_in_memory().unwrap();
        let source = record("v1", &["a", "b"]);

        let first = import_record(&mut db, &source, ImportMode::Incremental).unwrap();
        assert_eq!(
            first,
            ImportOutcome::Imported {
                messages: 2,
                rejected: 0
            }
        );

        let second = import_record(&mut db, &source, ImportMode::Incremental).unwrap();
        assert_eq!(second, ImportOutcome::Skipped { existing_messages: 2 });
        assert_eq!(db.video_message_count("v1").unwrap(), 2);
    }

    #[test]
    fn test_overwrite_replaces_message_set() {
        let mut db = ChatDatabase::new_in_memory().unwrap();
        import_record(&mut db, &record("v1", &["a", "b", "c"]), ImportMode::Overwrite).unwrap();
        import_record(&mut db, &record("v1", &["x"]), ImportMode::Overwrite).unwrap();

        let stored = db.get_messages("v1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].message, "x");
        assert_eq!(db.get_video("v1").unwrap().unwrap().total_messages, 1);
    }

    #[test]
    fn test_statistics_are_recomputed() {
        let mut db = ChatDatabase::new_in_memory().unwrap();
        let mut source = record("v1", &["a", "b"]);
        source.statistics.total_messages = 999;

        import_record(&mut db, &source, ImportMode::Overwrite).unwrap();
        let stored = db.get_video("v1").unwrap().unwrap();
        assert_eq!(stored.total_messages, 2);
        assert_eq!(stored.unique_authors, 2);
    }

    #[test]
    fn test_empty_overwrite_counts_as_imported() {
        let mut db = ChatDatabase::new_in_memory().unwrap();
        let summary = import_batch(
            &mut db,
            [ImportSource::Record(Box::new(record("v1", &[])))],
            ImportMode::Overwrite,
            &CancelFlag::new(),
        );
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.total_messages, 0);
        assert!(db.video_exists("v1").unwrap());
    }

    #[test]
    fn test_database_sink_imports_on_finalize() {
        let mut db = ChatDatabase::new_in_memory().unwrap();
        {
            let mut sink =
                DatabaseSink::new(&mut db, VideoInfo::new("v1", ""), ImportMode::Incremental);
            sink.append(&[ChatMessage::new("a", "UC_a", "hi", 0)]).unwrap();
            sink.append(&[ChatMessage::new("b", "UC_b", "yo", 1_000)])
                .unwrap();
            let summary = sink.finalize().unwrap();
            assert_eq!(summary.messages_written, 2);
            assert!(!summary.skipped);
        }

        {
            let mut sink =
                DatabaseSink::new(&mut db, VideoInfo::new("v1", ""), ImportMode::Incremental);
            sink.append(&[ChatMessage::new("c", "UC_c", "late", 0)]).unwrap();
            assert!(sink.finalize().unwrap().skipped);
        }

        assert_eq!(db.video_message_count("v1").unwrap(), 2);
    }

    #[test]
    fn test_dropped_database_sink_commits_nothing() {
        let mut db = ChatDatabase::new_in_memory().unwrap();
        {
            let mut sink =
                DatabaseSink::new(&mut db, VideoInfo::new("v1", ""), ImportMode::Overwrite);
            sink.append(&[ChatMessage::new("a", "UC_a", "hi", 0)]).unwrap();
        }
        assert!(!db.video_exists("v1").unwrap());
    }

    #[test]
    fn test_missing_directory_is_empty_summary() {
        let mut db = ChatDatabase::new_in_memory().unwrap();
        let summary = import_directory(
            &mut db,
            Path::new("/nonexistent/replaychat/dir"),
            ImportMode::Overwrite,
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(summary, BatchSummary::default());
    }

    #[test]
    fn test_import_error_from_live_chat_error() {
        let io = LiveChatError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(matches!(ImportError::from(io), ImportError::Io(_)));

        let parse = LiveChatError::invalid_format("bad");
        assert!(matches!(ImportError::from(parse), ImportError::Parse(_)));
    }

    #[test]
    fn test_blank_records_are_rejected() {
        let mut db = ChatDatabase::new_in_memory().unwrap();
        let mut source = record("v1", &["kept", "also kept"]);
        source.messages.push(ChatMessage::new("", "", "", 0));
        source.messages.push(ChatMessage::new("someone", "UC_x", "   ", 2_000));
        source.messages.push(ChatMessage::new(" ", "UC_y", "text", 3_000));

        let outcome = import_record(&mut db, &source, ImportMode::Overwrite).unwrap();
        assert_eq!(
            outcome,
            ImportOutcome::Imported {
                messages: 2,
                rejected: 3
            }
        );

        let stored = db.get_messages("v1").unwrap();
        assert!(stored.iter().all(|m| !m.author.is_empty() && !m.message.is_empty()));
        assert_eq!(db.get_video("v1").unwrap().unwrap().total_messages, 2);
    }

    #[test]
    fn test_cancelled_batch_stops_between_sources() {
        let mut db = ChatDatabase::new_in_memory().unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let summary = import_batch(
            &mut db,
            [
                ImportSource::Record(Box::new(record("v1", &["a"]))),
                ImportSource::Record(Box::new(record("v2", &["b"]))),
            ],
            ImportMode::Overwrite,
            &cancel,
        );

        assert!(summary.cancelled);
        assert_eq!(summary.total(), 0);
        assert!(!db.video_exists("v1").unwrap());
    }
}
