//! Pagination loop over a video's chat replay.
//!
//! Each cycle fetches the page for the current continuation, extracts its
//! records, checks whether the broadcast end has been reached, emits the
//! batch and advances to the next continuation. The loop stops on a
//! repeated continuation, the end of the broadcast, the end of the stream,
//! the iteration ceiling or cancellation.

use crate::api::continuation::find_next_continuation;
use crate::api::innertube::get_live_chat_replay::{extract_messages, NegativeOffsetPolicy};
use crate::api::innertube::{FetchError, InnerTube};
use crate::api::youtube::Continuation;
use crate::cancel::CancelFlag;
use crate::io::sink::{ChatSink, SinkError};
use crate::progress::{NoProgress, ReplayProgress};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

/// Anything that can serve replay pages by continuation.
#[async_trait]
pub trait ReplayPageSource: Send + Sync {
    async fn fetch_page(&self, continuation: &Continuation) -> Result<Value, FetchError>;
}

#[async_trait]
impl ReplayPageSource for InnerTube {
    async fn fetch_page(&self, continuation: &Continuation) -> Result<Value, FetchError> {
        self.fetch_replay_page(continuation).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOptions {
    pub max_iterations: usize,
    /// Pause between page requests
    pub request_delay: Duration,
    pub negative_offsets: NegativeOffsetPolicy,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            max_iterations: 3000,
            request_delay: Duration::from_millis(80),
            negative_offsets: NegativeOffsetPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum StopReason {
    #[display("continuation repeated")]
    CycleDetected,
    #[display("reached end of broadcast")]
    ReachedEnd,
    #[display("no more continuations")]
    StreamExhausted,
    #[display("iteration limit reached")]
    IterationLimit,
    #[display("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub stop_reason: StopReason,
    pub pages_fetched: usize,
    pub messages_emitted: u64,
    /// Largest offset seen across all fetched pages
    pub max_offset_ms: i64,
}

#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Offset in milliseconds at which a broadcast of `duration_secs` ends.
///
/// Saturates instead of wrapping for absurd durations.
pub fn end_offset_ms(duration_secs: u64) -> i64 {
    i64::try_from(duration_secs)
        .ok()
        .and_then(|secs| secs.checked_mul(1000))
        .unwrap_or(i64::MAX)
}

/// Progress position in seconds: the offset clamped to `[0, duration]`.
///
/// Without a known duration only the lower bound applies.
pub fn clamp_progress(max_offset_ms: i64, duration_secs: u64) -> u64 {
    let seconds = (max_offset_ms / 1000).max(0) as u64;
    if duration_secs == 0 {
        seconds
    } else {
        seconds.min(duration_secs)
    }
}

pub struct ReplayDownloader {
    options: ReplayOptions,
    cancel: CancelFlag,
    progress: Box<dyn ReplayProgress>,
}

impl ReplayDownloader {
    pub fn new(options: ReplayOptions) -> Self {
        Self {
            options,
            cancel: CancelFlag::new(),
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ReplayProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &dyn ReplayProgress {
        self.progress.as_ref()
    }

    /// Walk the replay from `initial`, emitting each page's batch to `sink`.
    ///
    /// `duration_secs` of 0 means the length is unknown and the loop runs
    /// until the stream itself ends. The sink is not finalized here.
    pub async fn download(
        &self,
        source: &dyn ReplayPageSource,
        initial: Continuation,
        duration_secs: u64,
        sink: &mut dyn ChatSink,
    ) -> Result<ReplayOutcome, ReplayError> {
        let policy = self.options.negative_offsets;
        let mut seen = HashSet::new();
        let mut continuation = initial;
        let mut pages_fetched = 0usize;
        let mut messages_emitted = 0u64;
        let mut max_offset_ms = 0i64;

        let stop_reason = loop {
            if self.cancel.is_cancelled() {
                tracing::warn!("🛑 Replay download cancelled");
                break StopReason::Cancelled;
            }
            if pages_fetched >= self.options.max_iterations {
                tracing::warn!(
                    "⚠️ Stopping after {} pages (iteration limit)",
                    self.options.max_iterations
                );
                break StopReason::IterationLimit;
            }
            if !seen.insert(continuation.clone()) {
                tracing::info!("🔁 Continuation repeated, stopping");
                break StopReason::CycleDetected;
            }

            let page = source.fetch_page(&continuation).await?;
            pages_fetched += 1;

            let batch = extract_messages(&page, policy);
            max_offset_ms = max_offset_ms.max(batch.max_offset_ms);
            self.progress
                .advance(clamp_progress(max_offset_ms, duration_secs), messages_emitted);

            if duration_secs > 0 && max_offset_ms >= end_offset_ms(duration_secs) {
                tracing::info!("🏁 Reached end of broadcast ({}s)", duration_secs);
                break StopReason::ReachedEnd;
            }

            sink.append(&batch.messages)?;
            messages_emitted += batch.messages.len() as u64;

            if pages_fetched % 20 == 0 {
                tracing::debug!(
                    pages = pages_fetched,
                    messages = messages_emitted,
                    position_secs = max_offset_ms / 1000,
                    "⏳ Replay progress"
                );
            }

            match find_next_continuation(&page) {
                Some(next) => continuation = next,
                None => {
                    tracing::info!("🟢 No more continuations");
                    break StopReason::StreamExhausted;
                }
            }

            if !self.options.request_delay.is_zero() {
                tokio::time::sleep(self.options.request_delay).await;
            }
        };

        tracing::info!(
            "✅ Replay finished: {} ({} pages, {} messages)",
            stop_reason,
            pages_fetched,
            messages_emitted
        );

        Ok(ReplayOutcome {
            stop_reason,
            pages_fetched,
            messages_emitted,
            max_offset_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::sink::CollectingSink;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Pages keyed by continuation; unknown tokens fail like a dead host.
    #[derive(Default)]
    struct FakeSource {
        pages: HashMap<String, Value>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn page(mut self, token: &str, offsets: &[i64], next: Option<&str>) -> Self {
            let actions: Vec<Value> = offsets
                .iter()
                .map(|offset| {
                    json!({"replayChatItemAction": {"actions": [{"addChatItemAction": {"item": {
                        "liveChatTextMessageRenderer": {
                            "authorName": {"simpleText": format!("user{offset}")},
                            "authorExternalChannelId": format!("UC_{offset}"),
                            "message": {"runs": [{"text": format!("at {offset}")}]},
                            "videoOffsetTimeMsec": offset.to_string()
                        }
                    }}}]}})
                })
                .collect();

            let mut contents = json!({"actions": actions});
            if let Some(next) = next {
                contents["continuations"] =
                    json!([{"liveChatReplayContinuationData": {"continuation": next}}]);
            }
            self.pages.insert(
                token.to_string(),
                json!({"continuationContents": {"liveChatContinuation": contents}}),
            );
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReplayPageSource for FakeSource {
        async fn fetch_page(&self, continuation: &Continuation) -> Result<Value, FetchError> {
            self.requests.lock().unwrap().push(continuation.0.clone());
            self.pages
                .get(&continuation.0)
                .cloned()
                .ok_or(FetchError::Exhausted {
                    attempts: 3,
                    last: "connection refused".to_string(),
                })
        }
    }

    fn downloader() -> ReplayDownloader {
        ReplayDownloader::new(ReplayOptions {
            request_delay: Duration::ZERO,
            ..ReplayOptions::default()
        })
    }

    fn token(value: &str) -> Continuation {
        Continuation(value.to_string())
    }

    #[tokio::test]
    async fn test_cycle_detected() {
        let source = FakeSource::default()
            .page("A", &[1_000], Some("B"))
            .page("B", &[2_000], Some("A"));
        let mut sink = CollectingSink::new();

        let outcome = downloader()
            .download(&source, token("A"), 0, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::CycleDetected);
        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(source.requested(), ["A", "B"]);
        assert_eq!(sink.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_stream_exhausted_preserves_order() {
        let source = FakeSource::default()
            .page("A", &[3_000, 1_000], Some("B"))
            .page("B", &[2_000], Some("C"))
            .page("C", &[4_000, 5_000], None);
        let mut sink = CollectingSink::new();

        let outcome = downloader()
            .download(&source, token("A"), 0, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::StreamExhausted);
        assert_eq!(outcome.pages_fetched, 3);
        assert_eq!(outcome.messages_emitted, 5);
        assert_eq!(outcome.max_offset_ms, 5_000);
        let offsets: Vec<i64> = sink.messages.iter().map(|m| m.offset_ms).collect();
        assert_eq!(offsets, [3_000, 1_000, 2_000, 4_000, 5_000]);
        assert_eq!(sink.batches, 3);
    }

    #[tokio::test]
    async fn test_reached_end_drops_final_batch() {
        let source = FakeSource::default()
            .page("A", &[10_000], Some("B"))
            .page("B", &[20_000, 61_000], Some("C"))
            .page("C", &[70_000], None);
        let mut sink = CollectingSink::new();

        let outcome = downloader()
            .download(&source, token("A"), 60, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::ReachedEnd);
        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(outcome.messages_emitted, 1);
        assert_eq!(sink.messages[0].offset_ms, 10_000);
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let source = FakeSource::default()
            .page("A", &[1_000], Some("B"))
            .page("B", &[2_000], Some("C"))
            .page("C", &[3_000], Some("D"));
        let mut sink = CollectingSink::new();

        let outcome = ReplayDownloader::new(ReplayOptions {
            max_iterations: 2,
            request_delay: Duration::ZERO,
            negative_offsets: NegativeOffsetPolicy::Strict,
        })
        .download(&source, token("A"), 0, &mut sink)
        .await
        .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::IterationLimit);
        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(source.requested(), ["A", "B"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_an_error() {
        let source = FakeSource::default().page("A", &[1_000], Some("missing"));
        let mut sink = CollectingSink::new();

        let err = downloader()
            .download(&source, token("A"), 0, &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReplayError::Fetch(FetchError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(sink.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let source = FakeSource::default().page("A", &[1_000], None);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut sink = CollectingSink::new();

        let outcome = downloader()
            .with_cancel_flag(cancel)
            .download(&source, token("A"), 0, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
        assert_eq!(outcome.pages_fetched, 0);
        assert!(source.requested().is_empty());
    }

    #[tokio::test]
    async fn test_negative_offsets_follow_policy() {
        let source = FakeSource::default().page("A", &[-500, 1_000], None);

        let mut strict = CollectingSink::new();
        downloader()
            .download(&source, token("A"), 0, &mut strict)
            .await
            .unwrap();
        assert_eq!(strict.messages.len(), 1);

        let mut permissive = CollectingSink::new();
        ReplayDownloader::new(ReplayOptions {
            request_delay: Duration::ZERO,
            negative_offsets: NegativeOffsetPolicy::Permissive,
            ..ReplayOptions::default()
        })
        .download(&source, token("A"), 0, &mut permissive)
        .await
        .unwrap();
        assert_eq!(permissive.messages.len(), 2);
        assert_eq!(permissive.messages[0].offset_ms, -500);
    }

    #[test]
    fn test_clamp_progress() {
        assert_eq!(clamp_progress(-5_000, 100), 0);
        assert_eq!(clamp_progress(50_500, 100), 50);
        assert_eq!(clamp_progress(500_000, 100), 100);
        assert_eq!(clamp_progress(500_000, 0), 500);
    }

    #[test]
    fn test_end_offset_ms_saturates() {
        assert_eq!(end_offset_ms(10), 10_000);
        assert_eq!(end_offset_ms(u64::MAX), i64::MAX);
        assert_eq!(end_offset_ms(i64::MAX as u64 / 1000 + 1), i64::MAX);
    }

    #[tokio::test]
    async fn test_huge_duration_does_not_end_early() {
        let source = FakeSource::default()
            .page("A", &[1_000], Some("B"))
            .page("B", &[2_000], None);
        let mut sink = CollectingSink::new();

        let outcome = downloader()
            .download(&source, token("A"), u64::MAX, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::StreamExhausted);
        assert_eq!(sink.messages.len(), 2);
    }
}
