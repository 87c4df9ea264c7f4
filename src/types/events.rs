//! Streaming events of the Responses API.
//!
//! Every SSE frame carries one JSON object discriminated by `type`. [`EventKind`]
//! is the closed set of recognized discriminators and [`ResponseStreamEvent`] has
//! exactly one variant per discriminator. Decoding lives in [`crate::protocol`].

use crate::types::response::{ContentPart, OutputItem, Response, SummaryPart};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Placeholder for opaque leaves the service omitted ("decode as empty for now").
pub(crate) fn empty_object() -> Value {
    Value::Object(Map::new())
}

macro_rules! stream_events {
    ($( $(#[$meta:meta])* $variant:ident($payload:ty) => $tag:literal, )+) => {
        /// Discriminator of a streaming event.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $( $variant, )+
        }

        impl EventKind {
            /// Every recognized discriminator, in wire-documentation order.
            pub const ALL: &'static [EventKind] = &[ $( EventKind::$variant, )+ ];

            pub fn parse(tag: &str) -> Option<Self> {
                match tag {
                    $( $tag => Some(Self::$variant), )+
                    _ => None,
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $tag, )+
                }
            }
        }

        /// A decoded streaming event.
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(tag = "type")]
        pub enum ResponseStreamEvent {
            $(
                $(#[$meta])*
                #[serde(rename = $tag)]
                $variant($payload),
            )+
        }

        impl ResponseStreamEvent {
            pub fn kind(&self) -> EventKind {
                match self {
                    $( Self::$variant(_) => EventKind::$variant, )+
                }
            }

            /// Monotonic sequence number, when the service attached one.
            pub fn sequence_number(&self) -> Option<u64> {
                match self {
                    $( Self::$variant(event) => event.sequence_number, )+
                }
            }

            pub(crate) fn from_payload(
                kind: EventKind,
                payload: Value,
            ) -> Result<Self, serde_json::Error> {
                Ok(match kind {
                    $( EventKind::$variant => Self::$variant(serde_json::from_value(payload)?), )+
                })
            }
        }
    };
}

stream_events! {
    ResponseCreated(ResponseSnapshotEvent) => "response.created",
    ResponseInProgress(ResponseSnapshotEvent) => "response.in_progress",
    ResponseCompleted(ResponseSnapshotEvent) => "response.completed",
    ResponseFailed(ResponseSnapshotEvent) => "response.failed",
    ResponseIncomplete(ResponseSnapshotEvent) => "response.incomplete",
    ResponseQueued(ResponseSnapshotEvent) => "response.queued",
    OutputItemAdded(OutputItemEvent) => "response.output_item.added",
    OutputItemDone(OutputItemEvent) => "response.output_item.done",
    ContentPartAdded(ContentPartEvent) => "response.content_part.added",
    ContentPartDone(ContentPartEvent) => "response.content_part.done",
    OutputTextDelta(TextDeltaEvent) => "response.output_text.delta",
    OutputTextDone(TextDoneEvent) => "response.output_text.done",
    RefusalDelta(TextDeltaEvent) => "response.refusal.delta",
    RefusalDone(RefusalDoneEvent) => "response.refusal.done",
    FunctionCallArgumentsDelta(ArgumentsDeltaEvent) => "response.function_call_arguments.delta",
    FunctionCallArgumentsDone(ArgumentsDoneEvent) => "response.function_call_arguments.done",
    FileSearchCallInProgress(ToolCallEvent) => "response.file_search_call.in_progress",
    FileSearchCallSearching(ToolCallEvent) => "response.file_search_call.searching",
    FileSearchCallCompleted(ToolCallEvent) => "response.file_search_call.completed",
    WebSearchCallInProgress(ToolCallEvent) => "response.web_search_call.in_progress",
    WebSearchCallSearching(ToolCallEvent) => "response.web_search_call.searching",
    WebSearchCallCompleted(ToolCallEvent) => "response.web_search_call.completed",
    ReasoningSummaryPartAdded(SummaryPartEvent) => "response.reasoning_summary_part.added",
    ReasoningSummaryPartDone(SummaryPartEvent) => "response.reasoning_summary_part.done",
    ReasoningSummaryTextDelta(SummaryTextDeltaEvent) => "response.reasoning_summary_text.delta",
    ReasoningSummaryTextDone(SummaryTextDoneEvent) => "response.reasoning_summary_text.done",
    ImageGenerationCallInProgress(ToolCallEvent) => "response.image_generation_call.in_progress",
    ImageGenerationCallGenerating(ToolCallEvent) => "response.image_generation_call.generating",
    ImageGenerationCallPartialImage(PartialImageEvent) => "response.image_generation_call.partial_image",
    ImageGenerationCallCompleted(ToolCallEvent) => "response.image_generation_call.completed",
    McpCallArgumentsDelta(ArgumentsDeltaEvent) => "response.mcp_call.arguments.delta",
    McpCallArgumentsDone(ArgumentsDoneEvent) => "response.mcp_call.arguments.done",
    McpCallInProgress(ToolCallEvent) => "response.mcp_call.in_progress",
    McpCallCompleted(ToolCallEvent) => "response.mcp_call.completed",
    McpCallFailed(ToolCallEvent) => "response.mcp_call.failed",
    McpListToolsInProgress(ToolCallEvent) => "response.mcp_list_tools.in_progress",
    McpListToolsCompleted(ToolCallEvent) => "response.mcp_list_tools.completed",
    McpListToolsFailed(ToolCallEvent) => "response.mcp_list_tools.failed",
    OutputTextAnnotationAdded(AnnotationAddedEvent) => "response.output_text_annotation.added",
    ReasoningDelta(ReasoningDeltaEvent) => "response.reasoning.delta",
    ReasoningDone(ReasoningDoneEvent) => "response.reasoning.done",
    ReasoningSummaryDelta(ReasoningSummaryDeltaEvent) => "response.reasoning_summary.delta",
    ReasoningSummaryDone(SummaryTextDoneEvent) => "response.reasoning_summary.done",
    /// Protocol-level error reported by the service.
    Error(ErrorEvent) => "error",
}

impl EventKind {
    /// Lifecycle events carry a full response snapshot.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::ResponseCreated
                | Self::ResponseInProgress
                | Self::ResponseCompleted
                | Self::ResponseFailed
                | Self::ResponseIncomplete
                | Self::ResponseQueued
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ResponseCompleted | Self::ResponseFailed | Self::ResponseIncomplete
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ResponseStreamEvent {
    /// The embedded snapshot of lifecycle events.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::ResponseCreated(e)
            | Self::ResponseInProgress(e)
            | Self::ResponseCompleted(e)
            | Self::ResponseFailed(e)
            | Self::ResponseIncomplete(e)
            | Self::ResponseQueued(e) => Some(&e.response),
            _ => None,
        }
    }

    pub fn output_index(&self) -> Option<u32> {
        Some(match self {
            Self::OutputItemAdded(e) | Self::OutputItemDone(e) => e.output_index,
            Self::ContentPartAdded(e) | Self::ContentPartDone(e) => e.output_index,
            Self::OutputTextDelta(e) | Self::RefusalDelta(e) => e.output_index,
            Self::OutputTextDone(e) => e.output_index,
            Self::RefusalDone(e) => e.output_index,
            Self::FunctionCallArgumentsDelta(e) | Self::McpCallArgumentsDelta(e) => e.output_index,
            Self::FunctionCallArgumentsDone(e) | Self::McpCallArgumentsDone(e) => e.output_index,
            Self::FileSearchCallInProgress(e)
            | Self::FileSearchCallSearching(e)
            | Self::FileSearchCallCompleted(e)
            | Self::WebSearchCallInProgress(e)
            | Self::WebSearchCallSearching(e)
            | Self::WebSearchCallCompleted(e)
            | Self::ImageGenerationCallInProgress(e)
            | Self::ImageGenerationCallGenerating(e)
            | Self::ImageGenerationCallCompleted(e)
            | Self::McpCallInProgress(e)
            | Self::McpCallCompleted(e)
            | Self::McpCallFailed(e)
            | Self::McpListToolsInProgress(e)
            | Self::McpListToolsCompleted(e)
            | Self::McpListToolsFailed(e) => e.output_index,
            Self::ReasoningSummaryPartAdded(e) | Self::ReasoningSummaryPartDone(e) => {
                e.output_index
            }
            Self::ReasoningSummaryTextDelta(e) => e.output_index,
            Self::ReasoningSummaryTextDone(e) | Self::ReasoningSummaryDone(e) => e.output_index,
            Self::ImageGenerationCallPartialImage(e) => e.output_index,
            Self::OutputTextAnnotationAdded(e) => e.output_index,
            Self::ReasoningDelta(e) => e.output_index,
            Self::ReasoningDone(e) => e.output_index,
            Self::ReasoningSummaryDelta(e) => e.output_index,
            Self::ResponseCreated(_)
            | Self::ResponseInProgress(_)
            | Self::ResponseCompleted(_)
            | Self::ResponseFailed(_)
            | Self::ResponseIncomplete(_)
            | Self::ResponseQueued(_)
            | Self::Error(_) => return None,
        })
    }

    pub fn item_id(&self) -> Option<&str> {
        let id: &str = match self {
            Self::OutputItemAdded(e) | Self::OutputItemDone(e) => return e.item.id(),
            Self::ContentPartAdded(e) | Self::ContentPartDone(e) => &e.item_id,
            Self::OutputTextDelta(e) | Self::RefusalDelta(e) => &e.item_id,
            Self::OutputTextDone(e) => &e.item_id,
            Self::RefusalDone(e) => &e.item_id,
            Self::FunctionCallArgumentsDelta(e) | Self::McpCallArgumentsDelta(e) => &e.item_id,
            Self::FunctionCallArgumentsDone(e) | Self::McpCallArgumentsDone(e) => &e.item_id,
            Self::FileSearchCallInProgress(e)
            | Self::FileSearchCallSearching(e)
            | Self::FileSearchCallCompleted(e)
            | Self::WebSearchCallInProgress(e)
            | Self::WebSearchCallSearching(e)
            | Self::WebSearchCallCompleted(e)
            | Self::ImageGenerationCallInProgress(e)
            | Self::ImageGenerationCallGenerating(e)
            | Self::ImageGenerationCallCompleted(e)
            | Self::McpCallInProgress(e)
            | Self::McpCallCompleted(e)
            | Self::McpCallFailed(e)
            | Self::McpListToolsInProgress(e)
            | Self::McpListToolsCompleted(e)
            | Self::McpListToolsFailed(e) => &e.item_id,
            Self::ReasoningSummaryPartAdded(e) | Self::ReasoningSummaryPartDone(e) => &e.item_id,
            Self::ReasoningSummaryTextDelta(e) => &e.item_id,
            Self::ReasoningSummaryTextDone(e) | Self::ReasoningSummaryDone(e) => &e.item_id,
            Self::ImageGenerationCallPartialImage(e) => &e.item_id,
            Self::OutputTextAnnotationAdded(e) => &e.item_id,
            Self::ReasoningDelta(e) => &e.item_id,
            Self::ReasoningDone(e) => &e.item_id,
            Self::ReasoningSummaryDelta(e) => &e.item_id,
            Self::ResponseCreated(_)
            | Self::ResponseInProgress(_)
            | Self::ResponseCompleted(_)
            | Self::ResponseFailed(_)
            | Self::ResponseIncomplete(_)
            | Self::ResponseQueued(_)
            | Self::Error(_) => return None,
        };
        Some(id)
    }
}

/// `response.created`, `response.completed`, ... : a full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshotEvent {
    pub response: Response,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItemEvent {
    pub output_index: u32,
    pub item: OutputItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPartEvent {
    pub item_id: String,
    pub output_index: u32,
    pub content_index: u32,
    pub part: ContentPart,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

/// Text fragment of an output text or refusal part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDeltaEvent {
    pub item_id: String,
    pub output_index: u32,
    pub content_index: u32,
    pub delta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDoneEvent {
    pub item_id: String,
    pub output_index: u32,
    pub content_index: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefusalDoneEvent {
    pub item_id: String,
    pub output_index: u32,
    pub content_index: u32,
    pub refusal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

/// Function-call or MCP-call argument fragment. The fragment is opaque: usually a
/// JSON text chunk, but any JSON value is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentsDeltaEvent {
    pub item_id: String,
    pub output_index: u32,
    #[serde(default = "empty_object")]
    pub delta: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentsDoneEvent {
    pub item_id: String,
    pub output_index: u32,
    #[serde(default = "empty_object")]
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

/// Progress marker of a hosted tool call (search, image generation, MCP).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub item_id: String,
    pub output_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialImageEvent {
    pub item_id: String,
    pub output_index: u32,
    pub partial_image_index: u32,
    pub partial_image_b64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPartEvent {
    pub item_id: String,
    pub output_index: u32,
    pub summary_index: u32,
    pub part: SummaryPart,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryTextDeltaEvent {
    pub item_id: String,
    pub output_index: u32,
    pub summary_index: u32,
    pub delta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

/// Final summary text; shared by `reasoning_summary_text.done` and `reasoning_summary.done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryTextDoneEvent {
    pub item_id: String,
    pub output_index: u32,
    pub summary_index: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationAddedEvent {
    pub item_id: String,
    pub output_index: u32,
    pub content_index: u32,
    pub annotation_index: u32,
    #[serde(default = "empty_object")]
    pub annotation: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningDeltaEvent {
    pub item_id: String,
    pub output_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_index: Option<u32>,
    #[serde(default = "empty_object")]
    pub delta: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningDoneEvent {
    pub item_id: String,
    pub output_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_index: Option<u32>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningSummaryDeltaEvent {
    pub item_id: String,
    pub output_index: u32,
    pub summary_index: u32,
    #[serde(default = "empty_object")]
    pub delta: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

/// `error`: every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

impl ErrorEvent {
    /// Never empty, even when the service sent neither code nor message.
    pub fn description(&self) -> String {
        let code = self.code.as_deref().filter(|c| !c.trim().is_empty());
        let message = self.message.as_deref().filter(|m| !m.trim().is_empty());
        match (code, message) {
            (Some(code), Some(message)) => format!("OpenAI error ({}): {}", code, message),
            (None, Some(message)) => format!("OpenAI error: {}", message),
            (Some(code), None) => format!("OpenAI error ({})", code),
            (None, None) => "OpenAI error (unspecified)".to_string(),
        }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())?;
        if let Some(param) = &self.param {
            write!(f, " [param: {}]", param)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_round_trips_through_its_tag() {
        assert_eq!(EventKind::ALL.len(), 44);
        for kind in EventKind::ALL {
            assert_eq!(EventKind::parse(kind.as_str()), Some(*kind));
        }
        assert_eq!(EventKind::parse("response.output_text.deltas"), None);
    }

    #[test]
    fn test_error_description_prefers_message_then_code() {
        let both = ErrorEvent {
            code: Some("server_error".into()),
            message: Some("boom".into()),
            ..Default::default()
        };
        assert_eq!(both.description(), "OpenAI error (server_error): boom");

        let blank_message = ErrorEvent {
            code: Some("rate_limited".into()),
            message: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(blank_message.description(), "OpenAI error (rate_limited)");
    }

    #[test]
    fn test_serialized_event_carries_its_discriminator() {
        let event = ResponseStreamEvent::OutputTextDelta(TextDeltaEvent {
            item_id: "msg_1".into(),
            output_index: 0,
            content_index: 0,
            delta: "Hi".into(),
            sequence_number: Some(4),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "response.output_text.delta");
        assert_eq!(json["sequence_number"], 4);
    }
}
