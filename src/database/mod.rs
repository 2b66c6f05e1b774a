pub mod crud;
pub mod exporter;
pub mod importer;
pub mod models;

pub use exporter::{export_record, export_videos, ExportError, ExportSummary};
pub use importer::{
    import_batch, import_directory, import_messages, import_record, interchange_files,
    BatchSummary, DatabaseSink, ImportError, ImportMode, ImportOutcome, ImportSource,
    SourceFailure,
};
pub use models::*;

use std::path::{Path, PathBuf};

/// チャットアーカイブ用データベース接続管理
pub struct ChatDatabase {
    pub connection: rusqlite::Connection,
    /// ファイルDBのパス（インメモリの場合はNone）
    path: Option<PathBuf>,
}

impl ChatDatabase {
    /// データベースを開き、スキーマがなければ作成する
    pub fn new<P: AsRef<Path>>(db_path: P) -> rusqlite::Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("⚠️ Failed to create {}: {}", parent.display(), e);
            }
        }

        let connection = rusqlite::Connection::open(&path)?;
        let db = Self {
            connection,
            path: Some(path),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// インメモリデータベースを作成（テスト用）
    pub fn new_in_memory() -> rusqlite::Result<Self> {
        let connection = rusqlite::Connection::open_in_memory()?;
        let db = Self {
            connection,
            path: None,
        };

        db.initialize_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// データベーススキーマを初期化
    fn initialize_schema(&self) -> rusqlite::Result<()> {
        self.connection.pragma_update(None, "foreign_keys", true)?;
        self.connection.execute_batch(include_str!("schema.sql"))?;
        tracing::debug!("Database schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_schema_creates_tables_and_indexes() {
        let db = ChatDatabase::new_in_memory().unwrap();

        let tables: Vec<String> = db
            .connection
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(tables.contains(&"videos".to_string()));
        assert!(tables.contains(&"chat_messages".to_string()));

        let index_count: i64 = db
            .connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(index_count, 4);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let db = ChatDatabase::new_in_memory().unwrap();
        let result = db.connection.execute(
            "INSERT INTO chat_messages (video_id, author, message) VALUES ('nope', 'a', 'm')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_open_file_database_twice() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("chat.db");

        {
            let db = ChatDatabase::new(&path).unwrap();
            assert_eq!(db.path(), Some(path.as_path()));
        }
        assert!(path.exists());
        ChatDatabase::new(&path).unwrap();
    }
}
