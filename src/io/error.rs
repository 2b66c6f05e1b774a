//! Errors raised while decoding replay actions and interchange files.

use thiserror::Error;

/// Decoding failures for chat data, whether it came off the wire or off disk.
///
/// `MissingField` and `InvalidFormat` are what a malformed replay action
/// produces; the extractor logs and drops those without aborting the page.
#[derive(Error, Debug)]
pub enum LiveChatError {
    /// I/O error when reading files
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error at line {line}: {source}")]
    JsonParse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Structure does not have the expected shape
    #[error("Invalid format: {reason}")]
    InvalidFormat { reason: String },

    /// Missing required field in data structure
    #[error("Missing required field '{field}' in {structure}")]
    MissingField { field: String, structure: String },
}

impl LiveChatError {
    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>, structure: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            structure: structure.into(),
        }
    }

    /// Create an invalid format error
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }

    /// Wrap a serde_json error, keeping the line it reported
    pub fn json(source: serde_json::Error) -> Self {
        Self::JsonParse {
            line: source.line(),
            source,
        }
    }

    /// True for errors describing a single malformed record
    pub fn is_malformed_record(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat { .. } | Self::MissingField { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = LiveChatError::missing_field("actions[0]", "replayChatItemAction");
        assert_eq!(
            error.to_string(),
            "Missing required field 'actions[0]' in replayChatItemAction"
        );
        assert!(error.is_malformed_record());
    }

    #[test]
    fn test_json_error_keeps_line() {
        let source = serde_json::from_str::<serde_json::Value>("{\n\"a\": }").unwrap_err();
        let error = LiveChatError::json(source);
        match &error {
            LiveChatError::JsonParse { line, .. } => assert_eq!(*line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!error.is_malformed_record());
    }
}
