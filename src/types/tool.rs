//! Tool calls extracted from finalized `function_call` output items.

use crate::types::response::{FunctionCallItem, OutputItem};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool call (invocation from model)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id to echo back with the tool output.
    pub call_id: String,
    pub name: String,
    /// Parsed JSON arguments. When the model produced text that is not valid
    /// JSON, the raw string is kept instead.
    pub arguments: Value,
}

impl ToolCall {
    pub fn from_function_call(item: &FunctionCallItem) -> Self {
        Self {
            call_id: item.call_id.clone(),
            name: item.name.clone(),
            arguments: parse_arguments(&item.arguments),
        }
    }

    /// Collects every function call from a list of output items, in output order.
    pub fn collect(items: &[OutputItem]) -> Vec<ToolCall> {
        items
            .iter()
            .filter_map(|item| match item {
                OutputItem::FunctionCall(call) => Some(Self::from_function_call(call)),
                _ => None,
            })
            .collect()
    }
}

/// Tolerant argument parsing: empty text becomes an empty object, invalid JSON
/// stays a string.
pub fn parse_arguments(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str::<Value>(trimmed).unwrap_or_else(|_| Value::String(raw.to_string()))
}
