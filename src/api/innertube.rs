pub mod get_live_chat_replay;

use crate::api::continuation::find_initial_continuation;
use crate::api::youtube::{
    extract_api_key, extract_client_version, extract_initial_data, ApiKey, ClientVersion,
    Continuation,
};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

const REPLAY_ENDPOINT: &str = "/youtubei/v1/live_chat/get_live_chat_replay";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const HTML_TIMEOUT: Duration = Duration::from_secs(20);
const API_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// Connection, timeout, send or body-read failure; retried
    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("HTTP request failed with status: {status}")]
    HttpStatus { status: reqwest::StatusCode },
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The watch page carried no embedded state; usually a sign-in wall
    #[error("ytInitialData not found in page (the video may require authentication)")]
    StateNotFound,
    #[error("No continuation token in page state (chat replay unavailable)")]
    ContinuationNotFound,
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Bounded retry for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

/// HTTP side of the replay API, shared by bootstrap and page fetches.
#[derive(Debug, Clone)]
pub struct InnerTubeClient {
    http: reqwest::Client,
    base_url: String,
    cookie_header: Option<String>,
    retry: RetryPolicy,
}

impl InnerTubeClient {
    pub fn new(
        base_url: impl Into<String>,
        cookie_header: Option<String>,
        retry: RetryPolicy,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cookie_header: cookie_header.filter(|h| !h.is_empty()),
            retry,
        })
    }

    pub async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        tracing::info!("🌐 Fetching video page: {}", url);

        let html = self
            .with_retry("page", move || async move {
                let mut request = self.http.get(url).timeout(HTML_TIMEOUT);
                if let Some(cookies) = &self.cookie_header {
                    request = request.header(reqwest::header::COOKIE, cookies);
                }
                let response = request.send().await.map_err(FetchError::Transport)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::HttpStatus { status });
                }
                response.text().await.map_err(FetchError::Transport)
            })
            .await?;

        tracing::debug!("📄 HTML response length: {} chars", html.len());
        Ok(html)
    }

    /// Resolve API context and the first continuation for `video_url`.
    pub async fn bootstrap_session(&self, video_url: &str) -> Result<InnerTube, FetchError> {
        let html = self.fetch_html(video_url).await?;

        let api_key = extract_api_key(&html);
        match &api_key {
            Some(key) => {
                let prefix: String = key.to_string().chars().take(10).collect();
                tracing::debug!("🔑 Extracted api_key: {}...", prefix);
            }
            None => tracing::warn!("⚠️ INNERTUBE_API_KEY not found, requests will omit the key"),
        }

        let client_version = extract_client_version(&html);
        tracing::debug!("📱 Client version: {}", client_version);

        let state = extract_initial_data(&html).ok_or_else(|| {
            tracing::error!("❌ ytInitialData not found in {}", video_url);
            FetchError::StateNotFound
        })?;

        let continuation = find_initial_continuation(&state).ok_or_else(|| {
            tracing::error!("❌ continuation not found in page state");
            FetchError::ContinuationNotFound
        })?;
        tracing::info!(
            "🔄 Initial continuation token: {}...",
            continuation.preview()
        );

        Ok(InnerTube {
            api_key,
            client_version,
            continuation,
            client: self.clone(),
        })
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let attempts = self.retry.attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(FetchError::Transport(e)) => {
                    tracing::warn!(
                        "⚠️ {} request failed (attempt {}/{}): {}",
                        what,
                        attempt,
                        attempts,
                        e
                    );
                    last = e.to_string();
                    if attempt < attempts && !self.retry.delay.is_zero() {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
                Err(other) => return Err(other),
            }
        }

        tracing::error!("❌ {} request failed after {} attempts", what, attempts);
        Err(FetchError::Exhausted { attempts, last })
    }
}

/// Session context for one video's replay.
#[derive(Debug, Clone)]
pub struct InnerTube {
    pub api_key: Option<ApiKey>,
    pub client_version: ClientVersion,
    /// First continuation of the replay
    pub continuation: Continuation,
    pub client: InnerTubeClient,
}

impl InnerTube {
    fn endpoint(&self) -> String {
        match &self.api_key {
            Some(key) => format!("{}{}?key={}", self.client.base_url, REPLAY_ENDPOINT, key),
            None => format!("{}{}", self.client.base_url, REPLAY_ENDPOINT),
        }
    }

    /// One replay page for `continuation`, uninterpreted.
    pub async fn fetch_replay_page(&self, continuation: &Continuation) -> Result<Value, FetchError> {
        let url = self.endpoint();
        let payload = serde_json::json!({
            "context": {
                "client": {
                    "clientName": "WEB",
                    "clientVersion": self.client_version.to_string()
                }
            },
            "continuation": continuation.0,
        });

        tracing::debug!("📡 Requesting replay page {}...", continuation.preview());

        let (url, payload) = (&url, &payload);
        let body = self
            .client
            .with_retry("replay", move || async move {
                let mut request = self
                    .client
                    .http
                    .post(url)
                    .timeout(API_TIMEOUT)
                    .json(payload);
                if let Some(cookies) = &self.client.cookie_header {
                    request = request.header(reqwest::header::COOKIE, cookies);
                }
                let response = request.send().await.map_err(FetchError::Transport)?;
                let status = response.status();
                if !status.is_success() {
                    tracing::error!("❌ Replay API returned {}", status);
                    return Err(FetchError::HttpStatus { status });
                }
                response.text().await.map_err(FetchError::Transport)
            })
            .await?;

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("❌ Failed to parse replay page: {}", e);
            tracing::debug!(
                "🔍 Response preview: {}",
                body.chars().take(200).collect::<String>()
            );
            FetchError::Serialization(e)
        })
    }
}
