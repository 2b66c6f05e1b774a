use crate::models::VideoInfo;
use serde::Serialize;

/// videosテーブルの1行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredVideo {
    pub video_id: String,
    pub title: String,
    pub duration: u64,
    pub upload_date: String,
    pub url: String,
    pub total_messages: u64,
    pub unique_authors: u64,
    pub time_range_min: String,
    pub time_range_max: String,
    pub imported_at: String,
    pub updated_at: String,
}

impl From<&StoredVideo> for VideoInfo {
    fn from(stored: &StoredVideo) -> Self {
        VideoInfo::new(&stored.video_id, &stored.url)
            .with_title(&stored.title)
            .with_duration(stored.duration)
            .with_upload_date(&stored.upload_date)
    }
}

/// データベース全体の統計
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatabaseStats {
    pub video_count: u64,
    pub message_count: u64,
    /// 空でないauthor_idの種類数
    pub author_count: u64,
    /// ファイルサイズ（インメモリの場合は0）
    pub db_size_bytes: u64,
    /// 空でないupload_dateの最小・最大
    pub date_range: Option<(String, String)>,
}

impl DatabaseStats {
    pub fn db_size_mb(&self) -> f64 {
        self.db_size_bytes as f64 / (1024.0 * 1024.0)
    }
}
