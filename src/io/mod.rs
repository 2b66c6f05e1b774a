//! Chat record outputs and the interchange file format.

pub mod error;
pub mod flat_log;
pub mod interchange;
pub mod sink;

pub use error::LiveChatError;
pub use flat_log::{dedup_file, remove_duplicate_lines, FlatLogSink};
pub use interchange::{interchange_file_name, load_record, save_record, InterchangeSink};
pub use sink::{ChatSink, CollectingSink, SinkError, SinkSummary};
