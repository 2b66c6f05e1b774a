//! Progress reporting for replay downloads.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;

/// Receives the orchestrator's progress signal.
///
/// Positions are seconds of broadcast already covered, clamped to the
/// video's duration.
pub trait ReplayProgress: Send + Sync {
    fn begin(&self, _label: &str, _duration_secs: u64) {}
    fn advance(&self, _position_secs: u64, _messages: u64) {}
    fn finish(&self, _summary: &str) {}
}

/// Discards every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ReplayProgress for NoProgress {}

/// Terminal bar, one per video.
#[derive(Debug, Default)]
pub struct ProgressBarReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressBarReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn style(has_duration: bool) -> ProgressStyle {
        let template = if has_duration {
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}s {msg}"
        } else {
            "[{elapsed_precise}] {spinner} {pos}s {msg}"
        };
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-")
    }
}

impl ReplayProgress for ProgressBarReporter {
    fn begin(&self, label: &str, duration_secs: u64) {
        let bar = if duration_secs > 0 {
            ProgressBar::new(duration_secs)
        } else {
            ProgressBar::new_spinner()
        };
        bar.set_draw_target(ProgressDrawTarget::stderr());
        bar.set_style(Self::style(duration_secs > 0));
        bar.set_message(label.to_string());

        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.replace(bar) {
                previous.abandon();
            }
        }
    }

    fn advance(&self, position_secs: u64, messages: u64) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.set_position(position_secs);
                bar.set_message(format!("{messages} messages"));
            }
        }
    }

    fn finish(&self, summary: &str) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_with_message(summary.to_string());
            }
        }
    }
}
