//! One pretty-printed JSON document per video.

use crate::io::error::LiveChatError;
use crate::io::sink::{ChatSink, SinkError, SinkSummary};
use crate::models::{ChatMessage, ChatReplayRecord, VideoInfo};
use std::fs;
use std::path::{Path, PathBuf};

/// `<upload_date|unknown>_<id>.json`
pub fn interchange_file_name(video: &VideoInfo) -> String {
    let date = if video.upload_date.is_empty() {
        "unknown"
    } else {
        video.upload_date.as_str()
    };
    format!("{}_{}.json", date, video.id)
}

/// Write `record` atomically: a temp file in the same directory, then rename.
pub fn save_record(path: &Path, record: &ChatReplayRecord) -> Result<(), SinkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(record)?;
    let mut tmp = path.to_path_buf().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, json)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Read an interchange record; absent fields take their defaults.
pub fn load_record(path: &Path) -> Result<ChatReplayRecord, LiveChatError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(LiveChatError::json)
}

/// Buffers the whole video and writes it on finalize.
pub struct InterchangeSink {
    video: VideoInfo,
    output_dir: PathBuf,
    messages: Vec<ChatMessage>,
    finalized: bool,
}

impl InterchangeSink {
    pub fn new(video: VideoInfo, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            video,
            output_dir: output_dir.into(),
            messages: Vec::new(),
            finalized: false,
        }
    }

    pub fn target(&self) -> PathBuf {
        self.output_dir.join(interchange_file_name(&self.video))
    }
}

impl ChatSink for InterchangeSink {
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

        let path = self.target();
        let record = ChatReplayRecord::new(self.video.clone(), std::mem::take(&mut self.messages));
        save_record(&path, &record)?;

        tracing::info!(
            "💾 Saved {} messages ({} authors) to {}",
            record.statistics.total_messages,
            record.statistics.unique_authors,
            path.display()
        );
        Ok(SinkSummary {
            messages_written: record.statistics.total_messages,
            path: Some(path),
            ..SinkSummary::default()
        })
    }
}
