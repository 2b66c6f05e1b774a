pub mod api;
pub mod cancel;
pub mod config;
pub mod database;
pub mod io;
pub mod logging;
pub mod models;
pub mod progress;

pub use api::innertube::get_live_chat_replay;

// Re-export the main error types for convenience
pub use api::auth::AuthError;
pub use api::innertube::FetchError;
pub use api::metadata::ResolveError;
pub use api::replay::ReplayError;
pub use database::ImportError;
pub use io::{LiveChatError, SinkError};

// Re-export the replay pipeline
pub use api::innertube::{InnerTube, InnerTubeClient, RetryPolicy};
pub use api::replay::{
    ReplayDownloader, ReplayOptions, ReplayOutcome, ReplayPageSource, StopReason,
};
pub use cancel::CancelFlag;
pub use get_live_chat_replay::NegativeOffsetPolicy;

// Re-export sinks and the store
pub use database::{ChatDatabase, DatabaseSink, ImportMode};
pub use io::{ChatSink, FlatLogSink, InterchangeSink};
pub use models::{ChatMessage, ChatReplayRecord, ImportStatistics, VideoInfo};
