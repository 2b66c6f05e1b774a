use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{ChatDatabase, DatabaseStats, StoredVideo};
use crate::models::{ChatMessage, ImportStatistics, VideoInfo};

/// 動画が登録済みか確認
pub fn video_exists(conn: &Connection, video_id: &str) -> rusqlite::Result<bool> {
    conn.prepare_cached("SELECT 1 FROM videos WHERE video_id = ?1")?
        .exists(params![video_id])
}

/// 動画に紐づくメッセージ数
pub fn video_message_count(conn: &Connection, video_id: &str) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM chat_messages WHERE video_id = ?1",
        params![video_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// 動画情報と集計を作成または更新（imported_atは初回の値を保持）
pub fn upsert_video(
    conn: &Connection,
    video: &VideoInfo,
    statistics: &ImportStatistics,
) -> rusqlite::Result<()> {
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO videos
         (video_id, title, duration, upload_date, url,
          total_messages, unique_authors, time_range_min, time_range_max,
          imported_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
         ON CONFLICT(video_id) DO UPDATE SET
             title = excluded.title,
             duration = excluded.duration,
             upload_date = excluded.upload_date,
             url = excluded.url,
             total_messages = excluded.total_messages,
             unique_authors = excluded.unique_authors,
             time_range_min = excluded.time_range_min,
             time_range_max = excluded.time_range_max,
             updated_at = excluded.updated_at",
        params![
            video.id,
            video.title,
            video.duration_seconds as i64,
            video.upload_date,
            video.url,
            statistics.total_messages as i64,
            statistics.unique_authors as i64,
            statistics.time_range.min,
            statistics.time_range.max,
            now,
        ],
    )?;

    Ok(())
}

/// メッセージを順番通りに追加
pub fn insert_messages(
    conn: &Connection,
    video_id: &str,
    messages: &[ChatMessage],
) -> rusqlite::Result<u64> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO chat_messages
         (video_id, time_text, author, author_id, message, offset_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    for message in messages {
        stmt.execute(params![
            video_id,
            message.time_text,
            message.author,
            message.author_id,
            message.message,
            message.offset_ms,
        ])?;
    }

    Ok(messages.len() as u64)
}

/// 動画のメッセージをすべて削除
pub fn delete_messages(conn: &Connection, video_id: &str) -> rusqlite::Result<u64> {
    let deleted = conn.execute(
        "DELETE FROM chat_messages WHERE video_id = ?1",
        params![video_id],
    )?;
    Ok(deleted as u64)
}

fn row_to_video(row: &Row) -> rusqlite::Result<StoredVideo> {
    Ok(StoredVideo {
        video_id: row.get(0)?,
        title: row.get(1)?,
        duration: row.get::<_, i64>(2)?.max(0) as u64,
        upload_date: row.get(3)?,
        url: row.get(4)?,
        total_messages: row.get::<_, i64>(5)?.max(0) as u64,
        unique_authors: row.get::<_, i64>(6)?.max(0) as u64,
        time_range_min: row.get(7)?,
        time_range_max: row.get(8)?,
        imported_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl ChatDatabase {
    pub fn video_exists(&self, video_id: &str) -> rusqlite::Result<bool> {
        video_exists(&self.connection, video_id)
    }

    pub fn video_message_count(&self, video_id: &str) -> rusqlite::Result<u64> {
        video_message_count(&self.connection, video_id)
    }

    /// 動画情報を取得
    pub fn get_video(&self, video_id: &str) -> rusqlite::Result<Option<StoredVideo>> {
        self.connection
            .query_row(
                "SELECT video_id, title, duration, upload_date, url,
                        total_messages, unique_authors, time_range_min, time_range_max,
                        imported_at, updated_at
                 FROM videos WHERE video_id = ?1",
                params![video_id],
                row_to_video,
            )
            .optional()
    }

    /// 登録済み動画IDをアップロード日順で取得
    pub fn video_ids(&self) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self
            .connection
            .prepare("SELECT video_id FROM videos ORDER BY upload_date, video_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// 動画のメッセージを挿入順で取得
    pub fn get_messages(&self, video_id: &str) -> rusqlite::Result<Vec<ChatMessage>> {
        let mut stmt = self.connection.prepare(
            "SELECT time_text, author, author_id, message, offset_ms
             FROM chat_messages WHERE video_id = ?1 ORDER BY id",
        )?;

        let messages = stmt
            .query_map(params![video_id], |row| {
                Ok(ChatMessage {
                    time_text: row.get(0)?,
                    author: row.get(1)?,
                    author_id: row.get(2)?,
                    message: row.get(3)?,
                    offset_ms: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(messages)
    }

    /// データベース全体の統計を取得
    pub fn stats(&self) -> rusqlite::Result<DatabaseStats> {
        let count = |sql: &str| -> rusqlite::Result<u64> {
            let value: i64 = self.connection.query_row(sql, [], |row| row.get(0))?;
            Ok(value.max(0) as u64)
        };

        let video_count = count("SELECT COUNT(*) FROM videos")?;
        let message_count = count("SELECT COUNT(*) FROM chat_messages")?;
        let author_count =
            count("SELECT COUNT(DISTINCT author_id) FROM chat_messages WHERE author_id != ''")?;

        let (min_date, max_date): (Option<String>, Option<String>) = self.connection.query_row(
            "SELECT MIN(upload_date), MAX(upload_date) FROM videos WHERE upload_date != ''",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = self
            .path()
            .and_then(|path| std::fs::metadata(path).ok())
            .map(|meta| meta.len())
            .unwrap_or(0);

        Ok(DatabaseStats {
            video_count,
            message_count,
            author_count,
            db_size_bytes,
            date_range: min_date.zip(max_date),
        })
    }
}
