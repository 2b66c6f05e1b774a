//! アプリケーション設定管理モジュール
//!
//! XDGディレクトリの`config.toml`を読み込みます。ファイルがなければ
//! デフォルト値を使い、コマンドライン引数で個別に上書きします。

use crate::api::innertube::get_live_chat_replay::NegativeOffsetPolicy;
use crate::api::innertube::{RetryPolicy, DEFAULT_BASE_URL};
use crate::api::replay::ReplayOptions;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// 取得設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// 1動画あたりのページ取得上限
    pub max_iterations: usize,
    /// ページ取得間隔（ミリ秒）
    pub request_delay_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// 配信開始前のチャットの扱い
    pub negative_offsets: NegativeOffsetPolicy,
    pub base_url: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3000,
            request_delay_ms: 80,
            retry_attempts: 3,
            retry_delay_ms: 3000,
            negative_offsets: NegativeOffsetPolicy::Strict,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl FetchConfig {
    pub fn replay_options(&self) -> ReplayOptions {
        ReplayOptions {
            max_iterations: self.max_iterations,
            request_delay: Duration::from_millis(self.request_delay_ms),
            negative_offsets: self.negative_offsets,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts.max(1),
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// 複数動画の処理設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// 動画間の待機時間（秒）
    pub video_interval_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            video_interval_secs: 5,
        }
    }
}

/// 出力先設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    pub database_path: PathBuf,
    /// Netscape形式のCookieファイル
    pub cookies_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("chat_replays"),
            database_path: PathBuf::from("chat_database.db"),
            cookies_path: PathBuf::from("www.youtube.com_cookies.txt"),
        }
    }
}

/// ログ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// カスタムログディレクトリ（Noneの場合はXDGデフォルト使用）
    pub log_dir: Option<PathBuf>,
    /// ログレベル (trace/debug/info/warn/error)
    pub log_level: String,
    /// ファイル出力有効化
    pub enable_file_logging: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            log_level: "info".to_string(),
            enable_file_logging: false,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub fetch: FetchConfig,
    pub batch: BatchConfig,
    pub output: OutputConfig,
    pub log: LogConfig,
}

/// 設定管理マネージャー
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// XDG設定ディレクトリの`config.toml`を使う
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: Self::default_config_path()?,
        })
    }

    /// 指定パスの設定ファイルを使う
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    fn default_config_path() -> Result<PathBuf> {
        let config_file = project_dirs()?.config_dir().join("config.toml");
        debug!("Config file path: {}", config_file.display());
        Ok(config_file)
    }

    /// 設定を読み込み
    pub fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            debug!(
                "Config file not found, using default settings: {}",
                self.config_path.display()
            );
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;

        let config: AppConfig = toml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse config file: {}",
                self.config_path.display()
            )
        })?;

        info!(
            "✅ Configuration loaded from: {}",
            self.config_path.display()
        );
        Ok(config)
    }

    /// 設定を保存
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;

        info!("💾 Configuration saved to: {}", self.config_path.display());
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config_exists(&self) -> bool {
        self.config_path.exists()
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "replaychat", "replaychat")
        .context("Failed to get project directories")
}

/// XDGデータディレクトリ配下のログディレクトリ
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.fetch.max_iterations, 3000);
        assert_eq!(config.fetch.request_delay_ms, 80);
        assert_eq!(config.fetch.negative_offsets, NegativeOffsetPolicy::Strict);
        assert_eq!(config.batch.video_interval_secs, 5);
        assert_eq!(config.output.database_path, PathBuf::from("chat_database.db"));

        let retry = config.fetch.retry_policy();
        assert_eq!(retry.attempts, 3);
        assert_eq!(retry.delay, Duration::from_secs(3));
    }

    #[test]
    fn test_config_manager_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = ConfigManager::with_path(temp_dir.path().join("nested").join("config.toml"));

        let mut config = AppConfig::default();
        config.fetch.negative_offsets = NegativeOffsetPolicy::Permissive;
        config.batch.video_interval_secs = 1;

        manager.save_config(&config).unwrap();
        assert!(manager.config_exists());
        assert_eq!(manager.load_config().unwrap(), config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[fetch]\nnegative_offsets = \"permissive\"\n\n[output]\noutput_dir = \"archive\"\n",
        )
        .unwrap();

        let config = ConfigManager::with_path(&path).load_config().unwrap();
        assert_eq!(
            config.fetch.negative_offsets,
            NegativeOffsetPolicy::Permissive
        );
        assert_eq!(config.fetch.max_iterations, 3000);
        assert_eq!(config.output.output_dir, PathBuf::from("archive"));
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let temp_dir = tempdir().unwrap();
        let manager = ConfigManager::with_path(temp_dir.path().join("nonexistent.toml"));
        assert_eq!(manager.load_config().unwrap(), AppConfig::default());
    }

    #[test]
    fn test_config_load_corrupted_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("corrupted.toml");
        fs::write(&path, "invalid toml content [unclosed section").unwrap();

        assert!(ConfigManager::with_path(&path).load_config().is_err());
    }

    #[test]
    fn test_replay_options_from_config() {
        let fetch = FetchConfig {
            request_delay_ms: 0,
            max_iterations: 10,
            ..FetchConfig::default()
        };
        let options = fetch.replay_options();
        assert_eq!(options.max_iterations, 10);
        assert!(options.request_delay.is_zero());
    }
}
