//! Depth-first continuation discovery over untyped JSON trees.
//!
//! Both the embedded page state and every replay page carry their cursor
//! somewhere below a field literally named `continuation`; its position
//! varies between layouts, so the tree is searched instead of addressed.
//! Traversal follows document order (`serde_json` is built with
//! `preserve_order`) and the first match wins.

use crate::api::youtube::Continuation;
use serde_json::Value;

const CONTINUATION_FIELD: &str = "continuation";

/// How an object's own `continuation` field ranks against its other fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchOrder {
    /// The object's own field is checked before any of its children
    NodeFirst,
    /// Fields are visited in order; each is checked, then descended
    FieldOrder,
}

/// First continuation exposed by the embedded page state.
///
/// An object carrying a `continuation` field matches before any of its
/// children are searched; arrays are searched element by element.
pub fn find_initial_continuation(state: &Value) -> Option<Continuation> {
    walk(state, SearchOrder::NodeFirst)
}

/// Continuation for the page after `page`, `None` at the end of the stream.
pub fn find_next_continuation(page: &Value) -> Option<Continuation> {
    walk(page, SearchOrder::FieldOrder)
}

/// Only non-empty strings are usable cursors; anything else is searched through.
fn as_token(value: &Value) -> Option<Continuation> {
    match value {
        Value::String(token) if !token.is_empty() => Some(Continuation(token.clone())),
        _ => None,
    }
}

fn walk(value: &Value, order: SearchOrder) -> Option<Continuation> {
    match value {
        Value::Object(fields) => {
            if order == SearchOrder::NodeFirst {
                if let Some(token) = fields.get(CONTINUATION_FIELD).and_then(as_token) {
                    return Some(token);
                }
            }
            for (name, child) in fields {
                if order == SearchOrder::FieldOrder && name == CONTINUATION_FIELD {
                    if let Some(token) = as_token(child) {
                        return Some(token);
                    }
                }
                if let Some(token) = walk(child, order) {
                    return Some(token);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(|item| walk(item, order)),
        _ => None,
    }
}
