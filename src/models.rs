//! Records shared by the replay fetcher, the sinks and the importer.
//!
//! The field names of these structures are the interchange format: one JSON
//! document per video with `video_info`, `messages` and `statistics`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Metadata of one archived broadcast, as resolved for the current run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Platform video identifier (primary identity in the store)
    #[serde(default = "unknown_video_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Length of the broadcast in seconds, 0 when the resolver could not tell
    #[serde(
        rename = "duration",
        default,
        deserialize_with = "deserialize_seconds"
    )]
    pub duration_seconds: u64,
    /// `YYYYMMDD` as reported by the resolver, empty when unknown
    #[serde(default)]
    pub upload_date: String,
    #[serde(default)]
    pub url: String,
}

fn unknown_video_id() -> String {
    "unknown".to_string()
}

/// Durations come from external tools and may be fractional or null.
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v as u64)
        .unwrap_or(0))
}

impl VideoInfo {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            duration_seconds: 0,
            upload_date: String::new(),
            url: url.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_duration(mut self, duration_seconds: u64) -> Self {
        self.duration_seconds = duration_seconds;
        self
    }

    pub fn with_upload_date(mut self, upload_date: impl Into<String>) -> Self {
        self.upload_date = upload_date.into();
        self
    }
}

/// One normalized chat entry of a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display timestamp relative to stream start (`M:SS` / `H:MM:SS`)
    #[serde(default = "zero_time_text")]
    pub time_text: String,
    /// Author display name
    #[serde(default)]
    pub author: String,
    /// External channel id of the author, empty for anonymous entries
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub message: String,
    /// Offset from stream start in milliseconds; negative for pre-stream chat
    #[serde(default)]
    pub offset_ms: i64,
}

fn zero_time_text() -> String {
    "0:00".to_string()
}

impl ChatMessage {
    pub fn new(
        author: impl Into<String>,
        author_id: impl Into<String>,
        message: impl Into<String>,
        offset_ms: i64,
    ) -> Self {
        Self {
            time_text: format_offset(offset_ms),
            author: author.into(),
            author_id: author_id.into(),
            message: message.into(),
            offset_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default = "zero_time_text")]
    pub min: String,
    #[serde(default = "zero_time_text")]
    pub max: String,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            min: zero_time_text(),
            max: zero_time_text(),
        }
    }
}

/// Per-video aggregate, always derived from a message set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStatistics {
    #[serde(default)]
    pub total_messages: u64,
    /// Distinct non-empty `author_id` values
    #[serde(default)]
    pub unique_authors: u64,
    #[serde(default)]
    pub time_range: TimeRange,
}

impl ImportStatistics {
    pub fn from_messages(messages: &[ChatMessage]) -> Self {
        let unique_authors = messages
            .iter()
            .filter(|m| !m.author_id.is_empty())
            .map(|m| m.author_id.as_str())
            .collect::<HashSet<_>>()
            .len();

        let min = messages.iter().map(|m| m.offset_ms).min().unwrap_or(0);
        let max = messages.iter().map(|m| m.offset_ms).max().unwrap_or(0);

        Self {
            total_messages: messages.len() as u64,
            unique_authors: unique_authors as u64,
            time_range: TimeRange {
                min: format_offset(min),
                max: format_offset(max),
            },
        }
    }
}

/// Interchange unit: everything captured for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReplayRecord {
    pub video_info: VideoInfo,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub statistics: ImportStatistics,
}

impl ChatReplayRecord {
    pub fn new(video_info: VideoInfo, messages: Vec<ChatMessage>) -> Self {
        let statistics = ImportStatistics::from_messages(&messages);
        Self {
            video_info,
            messages,
            statistics,
        }
    }
}

/// Format a millisecond offset as `M:SS`, or `H:MM:SS` once hours are reached.
///
/// Negative offsets keep their sign in front of the formatted magnitude.
pub fn format_offset(offset_ms: i64) -> String {
    let sign = if offset_ms < 0 { "-" } else { "" };
    let total_seconds = offset_ms.unsigned_abs() / 1000;
    let (hours, rest) = (total_seconds / 3600, total_seconds % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);

    if hours > 0 {
        format!("{sign}{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{sign}{minutes}:{seconds:02}")
    }
}

/// Format a raw offset value; anything that is not a number becomes `0:00`.
pub fn format_offset_text(raw: &str) -> String {
    parse_offset_ms(raw)
        .map(format_offset)
        .unwrap_or_else(zero_time_text)
}

/// Parse an offset given as integer or decimal text, truncating fractions.
pub(crate) fn parse_offset_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
}
