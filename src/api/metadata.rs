//! Video and channel metadata through `yt-dlp`.

use crate::models::VideoInfo;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use tokio::process::Command;

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("Unexpected metadata output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Resolves what the downloader needs to know before fetching chat.
#[async_trait]
pub trait VideoMetadataResolver: Send + Sync {
    async fn resolve_video(&self, url: &str) -> Result<VideoInfo, ResolveError>;

    /// Watch URLs of the channel's past broadcasts, in listing order.
    async fn list_past_broadcasts(&self, channel_url: &str) -> Result<Vec<String>, ResolveError>;
}

pub struct YtDlpResolver {
    program: String,
    cookies: Option<PathBuf>,
}

impl YtDlpResolver {
    pub fn new(cookies: Option<PathBuf>) -> Self {
        Self {
            program: "yt-dlp".to_string(),
            cookies,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn dump_json(&self, url: &str, flat: bool) -> Result<Value, ResolveError> {
        let mut command = Command::new(&self.program);
        command.arg("-J").arg("--no-warnings");
        if flat {
            command.arg("--flat-playlist");
        }
        if let Some(cookies) = &self.cookies {
            command.arg("--cookies").arg(cookies);
        }
        command.arg(url);

        tracing::debug!("🔧 Running {} for {}", self.program, url);
        let output = command.output().await.map_err(|source| ResolveError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ResolveError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[async_trait]
impl VideoMetadataResolver for YtDlpResolver {
    async fn resolve_video(&self, url: &str) -> Result<VideoInfo, ResolveError> {
        let json = self.dump_json(url, false).await?;
        let info = parse_video_json(&json, url)?;
        tracing::info!(
            "🎬 {} \"{}\" ({}s, uploaded {})",
            info.id,
            info.title,
            info.duration_seconds,
            if info.upload_date.is_empty() { "?" } else { info.upload_date.as_str() }
        );
        Ok(info)
    }

    async fn list_past_broadcasts(&self, channel_url: &str) -> Result<Vec<String>, ResolveError> {
        let json = self.dump_json(channel_url, true).await?;
        let urls = parse_channel_entries(&json);
        tracing::info!("✅ Found {} past broadcasts in {}", urls.len(), channel_url);
        Ok(urls)
    }
}

/// Map `yt-dlp -J` output for one video; the requested URL is kept.
pub fn parse_video_json(json: &Value, url: &str) -> Result<VideoInfo, serde_json::Error> {
    let mut info = deserialize_lenient(json)?;
    info.url = url.to_string();
    Ok(info)
}

/// Watch URLs of `was_live` entries, descending into nested playlists
/// (a channel root lists its tabs as playlists).
pub fn parse_channel_entries(json: &Value) -> Vec<String> {
    let mut urls = Vec::new();
    collect_entries(json, &mut urls);
    urls
}

fn collect_entries(json: &Value, urls: &mut Vec<String>) {
    let Some(entries) = json.get("entries").and_then(Value::as_array) else {
        return;
    };

    for entry in entries {
        if entry.get("entries").is_some() {
            collect_entries(entry, urls);
            continue;
        }
        let was_live = entry.get("live_status").and_then(Value::as_str) == Some("was_live");
        if let (true, Some(id)) = (was_live, entry.get("id").and_then(Value::as_str)) {
            urls.push(format!("https://www.youtube.com/watch?v={id}"));
        }
    }
}

fn deserialize_lenient(json: &Value) -> Result<VideoInfo, serde_json::Error> {
    // yt-dlp reports `null` for unknown strings
    let mut json = json.clone();
    if let Some(fields) = json.as_object_mut() {
        fields.retain(|_, value| !value.is_null());
    }
    VideoInfo::deserialize(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_video_json() {
        let json = json!({
            "id": "dQw4w9WgXcQ",
            "title": "Archive",
            "duration": 7260.0,
            "upload_date": "20240301",
            "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "formats": []
        });

        let info = parse_video_json(&json, "https://youtu.be/dQw4w9WgXcQ").unwrap();
        assert_eq!(info.id, "dQw4w9WgXcQ");
        assert_eq!(info.title, "Archive");
        assert_eq!(info.duration_seconds, 7260);
        assert_eq!(info.upload_date, "20240301");
        assert_eq!(info.url, "https://youtu.be/dQw4w9WgXcQ");
    }

    #[test]
    fn test_parse_video_json_with_nulls() {
        let json = json!({"id": null, "title": null, "duration": null, "upload_date": null});
        let info = parse_video_json(&json, "u").unwrap();
        assert_eq!(info.id, "unknown");
        assert_eq!(info.title, "");
        assert_eq!(info.duration_seconds, 0);
    }

    #[test]
    fn test_parse_channel_entries_filters_was_live() {
        let json = json!({
            "entries": [
                {"id": "a1", "live_status": "was_live"},
                {"id": "b2", "live_status": "not_live"},
                null,
                {"id": "c3", "live_status": "was_live"},
                {"id": "d4"}
            ]
        });

        assert_eq!(
            parse_channel_entries(&json),
            [
                "https://www.youtube.com/watch?v=a1",
                "https://www.youtube.com/watch?v=c3"
            ]
        );
    }

    #[test]
    fn test_parse_channel_entries_nested_tabs() {
        let json = json!({
            "entries": [
                {"title": "Videos", "entries": [{"id": "v1", "live_status": "not_live"}]},
                {"title": "Live", "entries": [{"id": "l1", "live_status": "was_live"}]}
            ]
        });

        assert_eq!(
            parse_channel_entries(&json),
            ["https://www.youtube.com/watch?v=l1"]
        );
        assert!(parse_channel_entries(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let resolver = YtDlpResolver::new(None).with_program("replaychat-no-such-binary");
        let err = resolver.resolve_video("https://example.invalid").await.unwrap_err();
        assert!(matches!(err, ResolveError::Spawn { .. }));
    }
}
