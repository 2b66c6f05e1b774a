//! Stored videos back out as interchange records.

use super::ChatDatabase;
use crate::cancel::CancelFlag;
use crate::io::interchange::{interchange_file_name, save_record};
use crate::io::sink::SinkError;
use crate::models::{ChatReplayRecord, VideoInfo};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Failed to write interchange file: {0}")]
    Write(#[from] SinkError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub exported: u64,
    /// Requested ids with no stored video
    pub missing: Vec<String>,
    pub total_messages: u64,
    pub files: Vec<PathBuf>,
    pub cancelled: bool,
}

/// The stored record of `video_id`, with statistics recomputed from its rows.
pub fn export_record(
    db: &ChatDatabase,
    video_id: &str,
) -> Result<Option<ChatReplayRecord>, ExportError> {
    let Some(stored) = db.get_video(video_id)? else {
        return Ok(None);
    };
    let messages = db.get_messages(video_id)?;
    Ok(Some(ChatReplayRecord::new(VideoInfo::from(&stored), messages)))
}

/// Write one interchange file per video into `output_dir`.
///
/// An empty `video_ids` exports every stored video.
pub fn export_videos(
    db: &ChatDatabase,
    video_ids: &[String],
    output_dir: &Path,
    cancel: &CancelFlag,
) -> Result<ExportSummary, ExportError> {
    let ids = if video_ids.is_empty() {
        db.video_ids()?
    } else {
        video_ids.to_vec()
    };

    let mut summary = ExportSummary::default();
    for id in &ids {
        if cancel.is_cancelled() {
            tracing::warn!("🛑 Export cancelled");
            summary.cancelled = true;
            break;
        }

        let Some(record) = export_record(db, id)? else {
            tracing::warn!("⚠️ Video not in database: {}", id);
            summary.missing.push(id.clone());
            continue;
        };

        let path = output_dir.join(interchange_file_name(&record.video_info));
        save_record(&path, &record)?;
        tracing::info!(
            "📤 Exported {} ({} messages) to {}",
            id,
            record.statistics.total_messages,
            path.display()
        );

        summary.exported += 1;
        summary.total_messages += record.statistics.total_messages;
        summary.files.push(path);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{import_record, ImportMode};
    use crate::models::ChatMessage;
    use tempfile::TempDir;

    fn stored_db() -> ChatDatabase {
        let mut db = ChatDatabase::new_in_memory().unwrap();
        let video = VideoInfo::new("v1", "https://www.youtube.com/watch?v=v1")
            .with_title("Archive")
            .with_duration(90)
            .with_upload_date("20240101");
        let record = ChatReplayRecord::new(
            video,
            vec![
                ChatMessage::new("a", "UC_a", "first", 1_000),
                ChatMessage::new("b", "UC_b", "second", 65_000),
            ],
        );
        import_record(&mut db, &record, ImportMode::Overwrite).unwrap();
        db
    }

    #[test]
    fn test_export_record() {
        let db = stored_db();
        let record = export_record(&db, "v1").unwrap().unwrap();

        assert_eq!(record.video_info.title, "Archive");
        assert_eq!(record.video_info.duration_seconds, 90);
        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.statistics.time_range.max, "1:05");
        assert!(export_record(&db, "nope").unwrap().is_none());
    }

    #[test]
    fn test_export_videos_reports_missing() {
        let db = stored_db();
        let temp_dir = TempDir::new().unwrap();

        let summary = export_videos(
            &db,
            &["v1".to_string(), "gone".to_string()],
            temp_dir.path(),
            &CancelFlag::new(),
        )
        .unwrap();

        assert_eq!(summary.exported, 1);
        assert_eq!(summary.missing, ["gone"]);
        assert_eq!(summary.files, [temp_dir.path().join("20240101_v1.json")]);
    }

    #[test]
    fn test_cancelled_export_writes_nothing() {
        let db = stored_db();
        let temp_dir = TempDir::new().unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let summary = export_videos(&db, &[], temp_dir.path(), &cancel).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.exported, 0);
        assert!(std::fs::read_dir(temp_dir.path()).unwrap().next().is_none());
    }
}
