//! Response snapshot model shared by lifecycle events and the aggregator.
//!
//! Lifecycle events (`response.created`, `response.completed`, ...) embed a full
//! snapshot of the response. Output items and content parts are tag-discriminated
//! by `type`; shapes this crate does not model are kept as raw JSON so a new
//! upstream item type never breaks decoding of the surrounding event.

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Lifecycle status reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Incomplete,
    Cancelled,
}

impl ResponseStatus {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "incomplete" => Self::Incomplete,
            "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Incomplete => "incomplete",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Incomplete | Self::Cancelled
        )
    }
}

/// A full response snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete_details: Option<IncompleteDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Remaining top-level fields (tools, temperature, text config, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Response {
    /// Concatenates every `output_text` part of every message item, in output order.
    pub fn output_text(&self) -> String {
        let mut text = String::new();
        for item in &self.output {
            if let OutputItem::Message(message) = item {
                for part in &message.content {
                    if let ContentPart::OutputText(part) = part {
                        text.push_str(&part.text);
                    }
                }
            }
        }
        text
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens_details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens_details: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteDetails {
    #[serde(default)]
    pub reason: Option<String>,
}

/// One element of `response.output`.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputItem {
    Message(MessageItem),
    FunctionCall(FunctionCallItem),
    FileSearchCall(SearchCallItem),
    WebSearchCall(SearchCallItem),
    ImageGenerationCall(ImageGenerationItem),
    Reasoning(ReasoningItem),
    McpCall(McpCallItem),
    McpListTools(McpListToolsItem),
    /// An item type this crate does not model; the raw JSON is preserved.
    Other { item_type: String, payload: Value },
}

impl OutputItem {
    pub fn item_type(&self) -> &str {
        match self {
            Self::Message(_) => "message",
            Self::FunctionCall(_) => "function_call",
            Self::FileSearchCall(_) => "file_search_call",
            Self::WebSearchCall(_) => "web_search_call",
            Self::ImageGenerationCall(_) => "image_generation_call",
            Self::Reasoning(_) => "reasoning",
            Self::McpCall(_) => "mcp_call",
            Self::McpListTools(_) => "mcp_list_tools",
            Self::Other { item_type, .. } => item_type,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Message(item) => item.id.as_deref(),
            Self::FunctionCall(item) => item.id.as_deref(),
            Self::FileSearchCall(item) | Self::WebSearchCall(item) => item.id.as_deref(),
            Self::ImageGenerationCall(item) => item.id.as_deref(),
            Self::Reasoning(item) => item.id.as_deref(),
            Self::McpCall(item) => item.id.as_deref(),
            Self::McpListTools(item) => item.id.as_deref(),
            Self::Other { payload, .. } => payload.get("id").and_then(Value::as_str),
        }
    }
}

impl<'de> Deserialize<'de> for OutputItem {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let item_type = type_tag(&value);
        let item = match item_type.as_str() {
            "message" => serde_json::from_value(value).map(Self::Message),
            "function_call" => serde_json::from_value(value).map(Self::FunctionCall),
            "file_search_call" => serde_json::from_value(value).map(Self::FileSearchCall),
            "web_search_call" => serde_json::from_value(value).map(Self::WebSearchCall),
            "image_generation_call" => {
                serde_json::from_value(value).map(Self::ImageGenerationCall)
            }
            "reasoning" => serde_json::from_value(value).map(Self::Reasoning),
            "mcp_call" => serde_json::from_value(value).map(Self::McpCall),
            "mcp_list_tools" => serde_json::from_value(value).map(Self::McpListTools),
            _ => {
                return Ok(Self::Other {
                    item_type,
                    payload: value,
                })
            }
        };
        item.map_err(D::Error::custom)
    }
}

impl Serialize for OutputItem {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let body = match self {
            Self::Message(item) => serde_json::to_value(item),
            Self::FunctionCall(item) => serde_json::to_value(item),
            Self::FileSearchCall(item) | Self::WebSearchCall(item) => serde_json::to_value(item),
            Self::ImageGenerationCall(item) => serde_json::to_value(item),
            Self::Reasoning(item) => serde_json::to_value(item),
            Self::McpCall(item) => serde_json::to_value(item),
            Self::McpListTools(item) => serde_json::to_value(item),
            Self::Other { payload, .. } => return payload.serialize(serializer),
        };
        let body = body.map_err(S::Error::custom)?;
        with_type_tag(body, self.item_type()).serialize(serializer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

fn default_role() -> String {
    "assistant".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub call_id: String,
    #[serde(default)]
    pub name: String,
    /// Raw JSON text as produced by the model.
    #[serde(default)]
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
}

/// Shared shape of `file_search_call` and `web_search_call` items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCallItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageGenerationItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Base64 image payload once generation finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub summary: Vec<SummaryPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentPart>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpCallItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub server_label: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpListToolsItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub server_label: String,
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// One element of a message's (or reasoning item's) `content`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    OutputText(OutputTextPart),
    Refusal(RefusalPart),
    ReasoningText(ReasoningTextPart),
    Other { part_type: String, payload: Value },
}

impl ContentPart {
    pub fn part_type(&self) -> &str {
        match self {
            Self::OutputText(_) => "output_text",
            Self::Refusal(_) => "refusal",
            Self::ReasoningText(_) => "reasoning_text",
            Self::Other { part_type, .. } => part_type,
        }
    }

    /// Text carried by the part, if it is a textual part.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::OutputText(part) => Some(&part.text),
            Self::Refusal(part) => Some(&part.refusal),
            Self::ReasoningText(part) => Some(&part.text),
            Self::Other { .. } => None,
        }
    }
}

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let part_type = type_tag(&value);
        let part = match part_type.as_str() {
            "output_text" => serde_json::from_value(value).map(Self::OutputText),
            "refusal" => serde_json::from_value(value).map(Self::Refusal),
            "reasoning_text" => serde_json::from_value(value).map(Self::ReasoningText),
            _ => {
                return Ok(Self::Other {
                    part_type,
                    payload: value,
                })
            }
        };
        part.map_err(D::Error::custom)
    }
}

impl Serialize for ContentPart {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let body = match self {
            Self::OutputText(part) => serde_json::to_value(part),
            Self::Refusal(part) => serde_json::to_value(part),
            Self::ReasoningText(part) => serde_json::to_value(part),
            Self::Other { payload, .. } => return payload.serialize(serializer),
        };
        let body = body.map_err(S::Error::custom)?;
        with_type_tag(body, self.part_type()).serialize(serializer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTextPart {
    #[serde(default)]
    pub text: String,
    /// Annotation shapes vary per tool; kept opaque.
    #[serde(default)]
    pub annotations: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefusalPart {
    #[serde(default)]
    pub refusal: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningTextPart {
    #[serde(default)]
    pub text: String,
}

/// A reasoning summary part (`summary_text`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPart {
    #[serde(rename = "type", default = "default_summary_type")]
    pub part_type: String,
    #[serde(default)]
    pub text: String,
}

impl SummaryPart {
    pub fn summary_text(text: impl Into<String>) -> Self {
        Self {
            part_type: default_summary_type(),
            text: text.into(),
        }
    }
}

fn default_summary_type() -> String {
    "summary_text".to_string()
}

fn type_tag(value: &Value) -> String {
    value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn with_type_tag(mut body: Value, tag: &str) -> Value {
    if let Value::Object(map) = &mut body {
        map.insert("type".to_string(), Value::String(tag.to_string()));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_item_type_is_preserved() {
        let item: OutputItem = serde_json::from_value(json!({
            "type": "computer_call",
            "id": "cu_1",
            "action": {"kind": "click"}
        }))
        .unwrap();

        assert_eq!(item.item_type(), "computer_call");
        assert_eq!(item.id(), Some("cu_1"));
        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["action"]["kind"], "click");
    }

    #[test]
    fn test_message_item_serializes_with_type_tag() {
        let item = OutputItem::Message(MessageItem {
            id: Some("msg_1".into()),
            role: "assistant".into(),
            status: Some(ResponseStatus::Completed),
            content: vec![ContentPart::OutputText(OutputTextPart {
                text: "hi".into(),
                ..Default::default()
            })],
        });

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["content"][0]["type"], "output_text");
        assert_eq!(json["content"][0]["text"], "hi");
    }

    #[test]
    fn test_snapshot_keeps_unmodelled_fields() {
        let response: Response = serde_json::from_value(json!({
            "id": "resp_1",
            "status": "in_progress",
            "temperature": 0.2,
            "output": []
        }))
        .unwrap();

        assert_eq!(response.status, Some(ResponseStatus::InProgress));
        assert_eq!(response.extra.get("temperature"), Some(&json!(0.2)));
    }
}
