//! Decoding of `get_live_chat_replay` pages into chat records.
//!
//! A page carries a list of actions. Chat entries sit at a fixed path:
//! `replayChatItemAction.actions[0].addChatItemAction.item`, where the item
//! is an object keyed by its renderer kind. Only plain text and paid
//! (Super Chat) renderers are turned into records; every other kind is
//! ignored.

use crate::io::LiveChatError;
use crate::models::{format_offset, format_offset_text, parse_offset_ms, ChatMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What to do with chat posted before the stream started.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum NegativeOffsetPolicy {
    /// Drop entries with a negative offset or a `-` display timestamp
    #[default]
    Strict,
    /// Keep them with their negative offset
    Permissive,
}

/// Recognized chat entry shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular chat line
    Text,
    /// Super Chat
    Paid,
}

impl EntryKind {
    pub fn from_renderer_key(key: &str) -> Option<Self> {
        match key {
            "liveChatTextMessageRenderer" => Some(Self::Text),
            "liveChatPaidMessageRenderer" => Some(Self::Paid),
            _ => None,
        }
    }

    pub fn renderer_key(self) -> &'static str {
        match self {
            Self::Text => "liveChatTextMessageRenderer",
            Self::Paid => "liveChatPaidMessageRenderer",
        }
    }
}

/// Outer wrapper of every replayed action.
#[derive(Debug, Deserialize)]
struct ReplayChatItemAction {
    #[serde(default)]
    actions: Vec<Value>,
}

/// Plain text container.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimpleText {
    #[serde(rename = "simpleText", default)]
    pub simple_text: Option<String>,
}

/// A message made of text and emoji runs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub runs: Vec<MessageRun>,
}

/// One fragment of a message; emoji runs carry no text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageRun {
    #[serde(default)]
    pub text: Option<String>,
}

impl Message {
    /// Text runs joined in order
    pub fn plain_text(&self) -> String {
        self.runs
            .iter()
            .filter_map(|run| run.text.as_deref())
            .collect()
    }
}

/// Fields shared by the text and paid renderers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRenderer {
    #[serde(rename = "authorName", default)]
    pub author_name: Option<SimpleText>,
    #[serde(rename = "authorExternalChannelId", default)]
    pub author_external_channel_id: Option<String>,
    /// Absent on paid entries sent without a comment
    #[serde(default)]
    pub message: Option<Message>,
    /// Offset from stream start; usually a decimal string
    #[serde(rename = "videoOffsetTimeMsec", default)]
    pub video_offset_time_msec: Option<Value>,
    /// Pre-formatted display timestamp, e.g. `-0:42` or `1:05:10`
    #[serde(rename = "timestampText", default)]
    pub timestamp_text: Option<SimpleText>,
    /// Only present on paid entries
    #[serde(rename = "purchaseAmountText", default)]
    pub purchase_amount_text: Option<SimpleText>,
}

/// A recognized chat entry, before normalization.
#[derive(Debug, Clone)]
pub struct ChatEntry {
    pub kind: EntryKind,
    pub renderer: ChatRenderer,
}

/// Records taken from one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedBatch {
    pub messages: Vec<ChatMessage>,
    /// Largest retained positive offset, 0 when there is none
    pub max_offset_ms: i64,
}

/// Action list of a replay page; missing or empty lists read as empty.
pub fn page_actions(page: &Value) -> &[Value] {
    let top_level = page
        .get("actions")
        .and_then(Value::as_array)
        .filter(|actions| !actions.is_empty());

    top_level
        .or_else(|| {
            page.pointer("/continuationContents/liveChatContinuation/actions")
                .and_then(Value::as_array)
        })
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Extract the normalized chat records of a whole page.
pub fn extract_messages(page: &Value, policy: NegativeOffsetPolicy) -> ExtractedBatch {
    extract_actions(page_actions(page), policy)
}

/// Extract normalized records from an action list, keeping action order.
pub fn extract_actions(actions: &[Value], policy: NegativeOffsetPolicy) -> ExtractedBatch {
    let mut batch = ExtractedBatch::default();

    for (index, action) in actions.iter().enumerate() {
        let entry = match decode_entry(action) {
            Ok(Some(entry)) => entry,
            Ok(None) => continue,
            Err(e) => {
                tracing::debug!("🔍 Dropping malformed action #{}: {}", index, e);
                continue;
            }
        };

        if let Some(message) = normalize_entry(&entry, policy) {
            batch.max_offset_ms = batch.max_offset_ms.max(message.offset_ms);
            batch.messages.push(message);
        }
    }

    batch
}

/// Walk the fixed action path down to a recognized renderer.
///
/// `Ok(None)` means the action is well formed but is not a chat entry
/// (tickers, banners, unknown renderer kinds).
pub fn decode_entry(action: &Value) -> Result<Option<ChatEntry>, LiveChatError> {
    let Some(replay) = action.get("replayChatItemAction") else {
        return Ok(None);
    };

    let replay = ReplayChatItemAction::deserialize(replay)
        .map_err(|e| LiveChatError::invalid_format(format!("replayChatItemAction: {e}")))?;
    let inner = replay
        .actions
        .first()
        .ok_or_else(|| LiveChatError::missing_field("actions[0]", "replayChatItemAction"))?;

    let Some(item) = inner.pointer("/addChatItemAction/item") else {
        return Ok(None);
    };
    let item = item
        .as_object()
        .ok_or_else(|| LiveChatError::invalid_format("addChatItemAction.item is not an object"))?;

    let Some((kind, payload)) = item
        .iter()
        .find_map(|(key, payload)| EntryKind::from_renderer_key(key).map(|kind| (kind, payload)))
    else {
        return Ok(None);
    };

    let renderer = ChatRenderer::deserialize(payload)
        .map_err(|e| LiveChatError::invalid_format(format!("{}: {e}", kind.renderer_key())))?;

    Ok(Some(ChatEntry { kind, renderer }))
}

/// Apply the normalization rules; `None` drops the entry.
pub fn normalize_entry(entry: &ChatEntry, policy: NegativeOffsetPolicy) -> Option<ChatMessage> {
    let renderer = &entry.renderer;

    let author = strip_control_chars(
        renderer
            .author_name
            .as_ref()
            .and_then(|name| name.simple_text.as_deref())
            .unwrap_or_default(),
    );
    let author = author.trim();
    if author.is_empty() {
        return None;
    }

    let text = renderer
        .message
        .as_ref()
        .map(Message::plain_text)
        .unwrap_or_default();
    let message = strip_control_chars(text.trim());
    let message = message.trim();
    if message.is_empty() {
        if entry.kind == EntryKind::Paid {
            tracing::trace!(
                "💰 Skipping paid entry without comment ({})",
                renderer
                    .purchase_amount_text
                    .as_ref()
                    .and_then(|amount| amount.simple_text.as_deref())
                    .unwrap_or("?")
            );
        }
        return None;
    }

    let (offset_ms, time_text) = match (&renderer.video_offset_time_msec, &renderer.timestamp_text)
    {
        (Some(raw), _) => match offset_from_value(raw) {
            Some(offset) if offset < 0 && policy == NegativeOffsetPolicy::Strict => return None,
            Some(offset) => (offset, format_offset(offset)),
            None => (0, format_offset_text(raw.as_str().unwrap_or_default())),
        },
        (None, Some(display)) => {
            let display = display.simple_text.as_deref().unwrap_or_default().trim();
            if display.starts_with('-') && policy == NegativeOffsetPolicy::Strict {
                return None;
            }
            let display = if display.is_empty() { "0:00" } else { display };
            (0, display.to_string())
        }
        (None, None) => (0, "0:00".to_string()),
    };

    Some(ChatMessage {
        time_text,
        author: author.to_string(),
        author_id: renderer
            .author_external_channel_id
            .clone()
            .unwrap_or_default(),
        message: message.to_string(),
        offset_ms,
    })
}

fn offset_from_value(raw: &Value) -> Option<i64> {
    match raw {
        Value::String(text) => parse_offset_ms(text),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v.trunc() as i64)),
        _ => None,
    }
}

/// Remove ASCII control bytes (0x00-0x1F, 0x7F).
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(*c, '\u{00}'..='\u{1F}' | '\u{7F}'))
        .collect()
}
