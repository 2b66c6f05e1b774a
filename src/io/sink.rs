//! Output capability the replay orchestrator writes through.

use crate::models::ChatMessage;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Import failed: {0}")]
    Import(String),

    #[error("Sink already finalized")]
    Finalized,
}

/// What a sink reports once its video is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkSummary {
    /// Records that reached the destination
    pub messages_written: u64,
    /// Duplicate lines dropped by the flat log pass
    pub duplicates_removed: u64,
    /// Where the output went, when it is a file
    pub path: Option<PathBuf>,
    /// True when an incremental database import found the video present
    pub skipped: bool,
}

/// Destination for one video's ordered batches.
///
/// `append` receives batches in page-arrival order. `finalize` is called
/// once after the orchestrator stops for any reason other than
/// cancellation or a fetch error; a sink dropped without it must leave no
/// committed output.
pub trait ChatSink: Send {
    fn append(&mut self, batch: &[ChatMessage]) -> Result<(), SinkError>;

    fn finalize(&mut self) -> Result<SinkSummary, SinkError>;
}

/// Keeps every batch in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub messages: Vec<ChatMessage>,
    pub batches: usize,
    pub finalized: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatSink for CollectingSink {
    fn append(&mut self, batch: &[ChatMessage]) -> Result<(), SinkError> {
        if self.finalized {
            return Err(SinkError::Finalized);
        }
        self.batches += 1;
        self.messages.extend_from_slice(batch);
        Ok(())
    }

    fn finalize(&mut self) -> Result<SinkSummary, SinkError> {
        if self.finalized {
            return Err(SinkError::Finalized);
        }
        self.finalized = true;
        Ok(SinkSummary {
            messages_written: self.messages.len() as u64,
            ..SinkSummary::default()
        })
    }
}
