//! Required wire fields per event kind.
//!
//! Checked before typed decoding so that an absent field is reported by name
//! instead of surfacing as a generic deserialization message. Opaque leaves
//! (`delta` of argument/reasoning deltas, `annotation`, `arguments`) are not
//! listed: they default to an empty object.

use crate::types::events::EventKind;

const SNAPSHOT: &[&str] = &["response"];
const OUTPUT_ITEM: &[&str] = &["output_index", "item"];
const CONTENT_PART: &[&str] = &["item_id", "output_index", "content_index", "part"];
const TEXT_DELTA: &[&str] = &["item_id", "output_index", "content_index", "delta"];
const TEXT_DONE: &[&str] = &["item_id", "output_index", "content_index", "text"];
const REFUSAL_DONE: &[&str] = &["item_id", "output_index", "content_index", "refusal"];
const ITEM_SCOPE: &[&str] = &["item_id", "output_index"];
const PARTIAL_IMAGE: &[&str] = &[
    "item_id",
    "output_index",
    "partial_image_index",
    "partial_image_b64",
];
const SUMMARY_PART: &[&str] = &["item_id", "output_index", "summary_index", "part"];
const SUMMARY_DELTA: &[&str] = &["item_id", "output_index", "summary_index", "delta"];
const SUMMARY_DONE: &[&str] = &["item_id", "output_index", "summary_index", "text"];
const SUMMARY_SCOPE: &[&str] = &["item_id", "output_index", "summary_index"];
const ANNOTATION: &[&str] = &["item_id", "output_index", "content_index", "annotation_index"];
const REASONING_DONE: &[&str] = &["item_id", "output_index", "text"];
const NONE: &[&str] = &[];

pub fn required_fields(kind: EventKind) -> &'static [&'static str] {
    use EventKind::*;
    match kind {
        ResponseCreated | ResponseInProgress | ResponseCompleted | ResponseFailed
        | ResponseIncomplete | ResponseQueued => SNAPSHOT,
        OutputItemAdded | OutputItemDone => OUTPUT_ITEM,
        ContentPartAdded | ContentPartDone => CONTENT_PART,
        OutputTextDelta | RefusalDelta => TEXT_DELTA,
        OutputTextDone => TEXT_DONE,
        RefusalDone => REFUSAL_DONE,
        FunctionCallArgumentsDelta | FunctionCallArgumentsDone | McpCallArgumentsDelta
        | McpCallArgumentsDone => ITEM_SCOPE,
        FileSearchCallInProgress | FileSearchCallSearching | FileSearchCallCompleted
        | WebSearchCallInProgress | WebSearchCallSearching | WebSearchCallCompleted
        | ImageGenerationCallInProgress | ImageGenerationCallGenerating
        | ImageGenerationCallCompleted | McpCallInProgress | McpCallCompleted | McpCallFailed
        | McpListToolsInProgress | McpListToolsCompleted | McpListToolsFailed => ITEM_SCOPE,
        ImageGenerationCallPartialImage => PARTIAL_IMAGE,
        ReasoningSummaryPartAdded | ReasoningSummaryPartDone => SUMMARY_PART,
        ReasoningSummaryTextDelta => SUMMARY_DELTA,
        ReasoningSummaryTextDone | ReasoningSummaryDone => SUMMARY_DONE,
        ReasoningSummaryDelta => SUMMARY_SCOPE,
        OutputTextAnnotationAdded => ANNOTATION,
        ReasoningDelta => ITEM_SCOPE,
        ReasoningDone => REASONING_DONE,
        Error => NONE,
    }
}
