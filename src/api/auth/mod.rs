//! YouTube認証モジュール
//!
//! ログインが必要なアーカイブのチャット取得に使うCookieを扱います。
//! Cookieファイルがない場合は匿名でアクセスします。

mod cookie_manager;

pub use cookie_manager::{CookieEntry, CookieManager, YouTubeCookies};

use std::path::PathBuf;

/// 認証関連のエラー型
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Cookieファイルが見つからない
    #[error("Cookie file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// 必要なCookieが見つからない
    #[error("Required cookie not found: {0}")]
    CookieNotFound(String),

    /// Cookieファイルの書式エラー
    #[error("Malformed cookie file at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// I/Oエラー
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;
