//! Cookie管理モジュール
//!
//! ブラウザからエクスポートしたNetscape形式のCookieファイルを読み込み、
//! YouTubeへのリクエスト用Cookieヘッダーに変換します。

use super::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::PathBuf;

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";
const YOUTUBE_DOMAIN: &str = "youtube.com";

/// Cookieファイルの1エントリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieEntry {
    pub domain: String,
    pub name: String,
    pub value: String,
    /// UNIX秒、0はセッションCookie
    pub expires: i64,
}

impl CookieEntry {
    /// Netscape形式の1行を解析（コメント・空行はNone）
    fn parse_line(line: &str, line_no: usize) -> AuthResult<Option<Self>> {
        let line = line.trim_end_matches(['\r', '\n']);
        let line = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => rest,
            None if line.trim().is_empty() || line.starts_with('#') => return Ok(None),
            None => line,
        };

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 7 {
            return Err(AuthError::Parse {
                line: line_no,
                reason: format!("expected 7 tab-separated fields, found {}", fields.len()),
            });
        }

        let expires = fields[4].trim().parse::<i64>().map_err(|_| AuthError::Parse {
            line: line_no,
            reason: format!("invalid expiry '{}'", fields[4]),
        })?;

        Ok(Some(Self {
            domain: fields[0].to_string(),
            name: fields[5].to_string(),
            value: fields[6..].join("\t"),
            expires,
        }))
    }

    fn is_youtube(&self) -> bool {
        let domain = self.domain.trim_start_matches('.');
        domain == YOUTUBE_DOMAIN || domain.ends_with(".youtube.com")
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires > 0 && self.expires < now.timestamp()
    }
}

/// YouTubeへ送るCookie一式
#[derive(Debug, Clone, PartialEq)]
pub struct YouTubeCookies {
    pub entries: Vec<CookieEntry>,
}

impl YouTubeCookies {
    /// Netscape形式のテキストから作成（youtube.com以外・期限切れは除外）
    pub fn from_netscape(content: &str) -> AuthResult<Self> {
        let now = Utc::now();
        let mut entries = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let Some(entry) = CookieEntry::parse_line(line, index + 1)? else {
                continue;
            };
            if entry.is_youtube() && !entry.is_expired(now) {
                entries.push(entry);
            }
        }

        Ok(Self { entries })
    }

    /// 特定のCookie値を取得
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.value.as_str())
    }

    /// 使えるCookieが1つ以上あるか
    pub fn is_valid(&self) -> bool {
        !self.entries.is_empty()
    }

    /// HTTPリクエスト用のCookieヘッダー文字列を生成
    pub fn to_cookie_header(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("{}={}", entry.name, entry.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Cookieファイル管理
pub struct CookieManager {
    /// Cookieファイルのパス
    cookie_path: PathBuf,
}

impl CookieManager {
    pub fn new(cookie_path: impl Into<PathBuf>) -> Self {
        Self {
            cookie_path: cookie_path.into(),
        }
    }

    /// Cookieを読み込み
    pub fn load(&self) -> AuthResult<YouTubeCookies> {
        if !self.cookie_path.exists() {
            return Err(AuthError::NotFound(self.cookie_path.clone()));
        }

        let content = fs::read_to_string(&self.cookie_path)?;
        let cookies = YouTubeCookies::from_netscape(&content)?;

        if !cookies.is_valid() {
            return Err(AuthError::CookieNotFound(YOUTUBE_DOMAIN.to_string()));
        }

        tracing::debug!(
            "🍪 Loaded {} cookies from {}",
            cookies.entries.len(),
            self.cookie_path.display()
        );
        Ok(cookies)
    }

    /// ファイルがあれば読み込み、なければ匿名アクセス（None）
    pub fn load_optional(&self) -> AuthResult<Option<YouTubeCookies>> {
        match self.load() {
            Ok(cookies) => Ok(Some(cookies)),
            Err(AuthError::NotFound(path)) => {
                tracing::warn!(
                    "⚠️ Cookie file {} not found, continuing without authentication",
                    path.display()
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Cookieファイルが存在するか確認
    pub fn exists(&self) -> bool {
        self.cookie_path.exists()
    }
}
