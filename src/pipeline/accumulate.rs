//! Incremental reconstruction of responses from the event stream.
//!
//! [`ResponseAggregator`] owns one stream's state: an arena of
//! [`ResponseAggregate`]s keyed by response id, plus the id of the response that
//! item-scoped events currently refer to (those events carry no response id on
//! the wire). Each aggregate keeps its output items keyed by output index and,
//! inside each item, text buffers keyed by content or summary index.
//!
//! Lifecycle of an aggregate:
//!
//! ```text
//! Created ─┐
//!          ├─► InProgress ─► Completed | Failed | Incomplete
//! Queued ──┘       │
//!                  └──────► Cancelled (local cancellation only)
//! ```
//!
//! Per scope (item, part, summary): `Added → (Delta)* → Done`. A `done` value is
//! authoritative and replaces whatever the deltas accumulated.

use crate::config::AggregationConfig;
use crate::pipeline::sequence::{SequenceGuard, SequenceStatus};
use crate::types::events::{ErrorEvent, EventKind, ResponseStreamEvent};
use crate::types::response::{
    ContentPart, FunctionCallItem, ImageGenerationItem, IncompleteDetails, McpCallItem,
    McpListToolsItem, MessageItem, OutputItem, OutputTextPart, ReasoningItem, ReasoningTextPart,
    RefusalPart, Response, ResponseStatus, SearchCallItem, SummaryPart,
};
use crate::types::tool::ToolCall;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, warn};

/// Lifecycle state of one response aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateState {
    Created,
    Queued,
    InProgress,
    Completed,
    Failed,
    Incomplete,
    /// Cancelled locally before the service finished; never reported as completed.
    Cancelled,
}

impl AggregateState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Incomplete | Self::Cancelled
        )
    }

    fn from_lifecycle(kind: EventKind) -> Option<Self> {
        Some(match kind {
            EventKind::ResponseCreated => Self::Created,
            EventKind::ResponseQueued => Self::Queued,
            EventKind::ResponseInProgress => Self::InProgress,
            EventKind::ResponseCompleted => Self::Completed,
            EventKind::ResponseFailed => Self::Failed,
            EventKind::ResponseIncomplete => Self::Incomplete,
            _ => return None,
        })
    }

    fn status(&self) -> ResponseStatus {
        match self {
            Self::Created | Self::InProgress => ResponseStatus::InProgress,
            Self::Queued => ResponseStatus::Queued,
            Self::Completed => ResponseStatus::Completed,
            Self::Failed => ResponseStatus::Failed,
            Self::Incomplete | Self::Cancelled => ResponseStatus::Incomplete,
        }
    }
}

/// Location of an accumulation scope inside the active response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub item_id: Option<String>,
    pub output_index: u32,
    /// Content, summary or annotation index, depending on the event.
    pub sub_index: Option<u32>,
}

impl Scope {
    fn item(item_id: Option<&str>, output_index: u32) -> Self {
        Self {
            item_id: item_id.map(str::to_string),
            output_index,
            sub_index: None,
        }
    }

    fn part(item_id: &str, output_index: u32, sub_index: u32) -> Self {
        Self {
            item_id: Some(item_id.to_string()),
            output_index,
            sub_index: Some(sub_index),
        }
    }
}

/// Non-fatal observation made while applying an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Sequence gap or regression (never `Ok`/`Unknown`).
    Sequence(SequenceStatus),
    /// Event for a response that already reached a terminal state; not applied.
    LateEventAfterTerminal {
        response_id: String,
        kind: EventKind,
    },
    /// Delta for a scope that was already finalized; not applied.
    DeltaAfterDone { kind: EventKind, scope: Scope },
    /// Second `done` for the same scope; not applied.
    DuplicateDone { kind: EventKind, scope: Scope },
    /// `done` text differed from the accumulated deltas; the `done` text won.
    DoneTextMismatch {
        kind: EventKind,
        scope: Scope,
        accumulated: String,
        authoritative: String,
    },
    /// Scope was referenced before being announced and was created on the fly.
    ImplicitScope { kind: EventKind, scope: Scope },
    /// Item-scoped event with no active response to attach it to.
    UnscopedEvent { kind: EventKind },
}

/// What applying one event did.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Mutated,
    /// The response reached a terminal state with this event.
    Finalized(AggregateState),
    NoOp,
    /// The service reported an error; surfaced as a first-class outcome.
    Error(ErrorEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationResult {
    pub outcome: Outcome,
    pub sequence: SequenceStatus,
    pub diagnostics: Vec<Diagnostic>,
}

impl AggregationResult {
    pub fn is_finalized(&self) -> bool {
        matches!(self.outcome, Outcome::Finalized(_))
    }

    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Accumulated text of one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
    done: bool,
}

enum Finish {
    Done { previous: String },
    Duplicate,
}

impl TextBuffer {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn push(&mut self, fragment: &str) -> bool {
        if self.done {
            return false;
        }
        self.text.push_str(fragment);
        true
    }

    fn finish(&mut self, authoritative: &str) -> Finish {
        if self.done {
            return Finish::Duplicate;
        }
        let previous = std::mem::replace(&mut self.text, authoritative.to_string());
        self.done = true;
        Finish::Done { previous }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartKind {
    OutputText,
    Refusal,
    ReasoningText,
    SummaryText,
}

/// A content part or reasoning summary part under construction.
#[derive(Debug, Clone)]
pub struct PartState {
    kind: PartKind,
    template: Option<ContentPart>,
    text: TextBuffer,
    annotations: BTreeMap<u32, Value>,
    closed: bool,
}

impl PartState {
    fn new(kind: PartKind) -> Self {
        Self {
            kind,
            template: None,
            text: TextBuffer::default(),
            annotations: BTreeMap::new(),
            closed: false,
        }
    }

    fn from_part(part: &ContentPart) -> Self {
        let kind = match part {
            ContentPart::Refusal(_) => PartKind::Refusal,
            ContentPart::ReasoningText(_) => PartKind::ReasoningText,
            ContentPart::OutputText(_) | ContentPart::Other { .. } => PartKind::OutputText,
        };
        let mut state = Self::new(kind);
        state.template = Some(part.clone());
        state
    }

    pub fn text(&self) -> &TextBuffer {
        &self.text
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn to_content_part(&self) -> ContentPart {
        let text = self.text.as_str().to_string();
        match (&self.template, self.kind) {
            (Some(template @ ContentPart::Other { .. }), _) if text.is_empty() => template.clone(),
            (Some(ContentPart::OutputText(template)), PartKind::OutputText) => {
                let mut part = template.clone();
                part.text = text;
                part.annotations = self.merged_annotations(&template.annotations);
                ContentPart::OutputText(part)
            }
            (_, PartKind::Refusal) => ContentPart::Refusal(RefusalPart { refusal: text }),
            (_, PartKind::ReasoningText) => ContentPart::ReasoningText(ReasoningTextPart { text }),
            _ => ContentPart::OutputText(OutputTextPart {
                text,
                annotations: self.merged_annotations(&[]),
                logprobs: None,
            }),
        }
    }

    fn closes(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }

    fn merged_annotations(&self, seed: &[Value]) -> Vec<Value> {
        let mut merged: BTreeMap<u32, Value> = seed
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u32, v.clone()))
            .collect();
        for (index, annotation) in &self.annotations {
            merged.insert(*index, annotation.clone());
        }
        merged.into_values().collect()
    }
}

/// Progress of a hosted tool call as reported by its sub-protocol events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallPhase {
    InProgress,
    Searching,
    Generating,
    Completed,
    Failed,
}

impl ToolCallPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Searching => "searching",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialImage {
    pub index: u32,
    pub b64: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPhase {
    Added,
    Streaming,
    Done,
}

/// One output item under construction.
#[derive(Debug, Clone)]
pub struct ItemState {
    output_index: u32,
    item_id: Option<String>,
    /// Latest snapshot from `output_item.added`/`done` or a terminal response.
    snapshot: Option<OutputItem>,
    /// Shape to materialize when no snapshot was ever received.
    fallback: OutputItem,
    phase: ItemPhase,
    parts: BTreeMap<u32, PartState>,
    summaries: BTreeMap<u32, PartState>,
    arguments: TextBuffer,
    tool_phase: Option<ToolCallPhase>,
    partial_image: Option<PartialImage>,
}

impl ItemState {
    fn new(output_index: u32, item_id: Option<String>, fallback: OutputItem) -> Self {
        Self {
            output_index,
            item_id,
            snapshot: None,
            fallback,
            phase: ItemPhase::Added,
            parts: BTreeMap::new(),
            summaries: BTreeMap::new(),
            arguments: TextBuffer::default(),
            tool_phase: None,
            partial_image: None,
        }
    }

    fn adopted(output_index: u32, item: OutputItem) -> Self {
        let mut state = Self::new(output_index, item.id().map(str::to_string), item.clone());
        state.snapshot = Some(item);
        state.phase = ItemPhase::Done;
        state
    }

    pub fn output_index(&self) -> u32 {
        self.output_index
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn phase(&self) -> ItemPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == ItemPhase::Done
    }

    pub fn part(&self, content_index: u32) -> Option<&PartState> {
        self.parts.get(&content_index)
    }

    pub fn summary(&self, summary_index: u32) -> Option<&PartState> {
        self.summaries.get(&summary_index)
    }

    pub fn arguments(&self) -> &TextBuffer {
        &self.arguments
    }

    pub fn tool_phase(&self) -> Option<ToolCallPhase> {
        self.tool_phase
    }

    pub fn partial_image(&self) -> Option<&PartialImage> {
        self.partial_image.as_ref()
    }

    fn base(&self) -> &OutputItem {
        self.snapshot.as_ref().unwrap_or(&self.fallback)
    }

    /// Content parts in index order with a flag telling whether each is final.
    ///
    /// Per index: a finalized streamed part wins, then a snapshot part, then the
    /// partial streamed text.
    fn content_parts(&self, snapshot_parts: &[ContentPart]) -> Vec<(ContentPart, bool)> {
        let snapshot_final = self.snapshot.is_some() && self.is_done();
        let mut merged: BTreeMap<u32, (ContentPart, bool)> = snapshot_parts
            .iter()
            .enumerate()
            .map(|(i, part)| (i as u32, (part.clone(), snapshot_final)))
            .collect();
        for (index, state) in &self.parts {
            let done = state.text.is_done();
            let snapshot_wins = !done && matches!(merged.get(index), Some((_, true)));
            if !snapshot_wins {
                merged.insert(*index, (state.to_content_part(), done));
            }
        }
        merged.into_values().collect()
    }

    fn summary_parts(&self, snapshot_parts: &[SummaryPart]) -> Vec<SummaryPart> {
        let mut merged: BTreeMap<u32, SummaryPart> = snapshot_parts
            .iter()
            .enumerate()
            .map(|(i, part)| (i as u32, part.clone()))
            .collect();
        for (index, state) in &self.summaries {
            if state.text.is_done() || !merged.contains_key(index) {
                merged.insert(*index, SummaryPart::summary_text(state.text.as_str()));
            }
        }
        merged.into_values().collect()
    }

    fn merged_arguments(&self, snapshot_arguments: &str) -> String {
        if self.arguments.is_done() || snapshot_arguments.is_empty() {
            self.arguments.as_str().to_string()
        } else {
            snapshot_arguments.to_string()
        }
    }

    /// Builds the output item from the snapshot and the streamed state.
    pub fn materialize(&self) -> OutputItem {
        let status = self.tool_phase.map(|phase| phase.as_str().to_string());
        match self.base().clone() {
            OutputItem::Message(mut message) => {
                message.content = self
                    .content_parts(&message.content)
                    .into_iter()
                    .map(|(part, _)| part)
                    .collect();
                if message.status.is_none() && self.is_done() {
                    message.status = Some(ResponseStatus::Completed);
                }
                OutputItem::Message(message)
            }
            OutputItem::FunctionCall(mut call) => {
                call.arguments = self.merged_arguments(&call.arguments);
                OutputItem::FunctionCall(call)
            }
            OutputItem::McpCall(mut call) => {
                call.arguments = self.merged_arguments(&call.arguments);
                OutputItem::McpCall(call)
            }
            OutputItem::Reasoning(mut reasoning) => {
                reasoning.summary = self.summary_parts(&reasoning.summary);
                if !self.parts.is_empty() {
                    let existing = reasoning.content.take().unwrap_or_default();
                    reasoning.content = Some(
                        self.content_parts(&existing)
                            .into_iter()
                            .map(|(part, _)| part)
                            .collect(),
                    );
                }
                OutputItem::Reasoning(reasoning)
            }
            OutputItem::FileSearchCall(mut call) => {
                call.status = call.status.or(status);
                OutputItem::FileSearchCall(call)
            }
            OutputItem::WebSearchCall(mut call) => {
                call.status = call.status.or(status);
                OutputItem::WebSearchCall(call)
            }
            OutputItem::ImageGenerationCall(mut call) => {
                call.status = call.status.or(status);
                OutputItem::ImageGenerationCall(call)
            }
            other => other,
        }
    }

    /// Concatenated finalized `output_text` of a message item.
    fn finalized_text(&self) -> String {
        let OutputItem::Message(message) = self.base() else {
            return String::new();
        };
        self.content_parts(&message.content)
            .into_iter()
            .filter(|(_, finalized)| *finalized)
            .filter_map(|(part, _)| match part {
                ContentPart::OutputText(part) => Some(part.text),
                _ => None,
            })
            .collect()
    }
}

/// In-memory reconstruction of one response.
#[derive(Debug, Clone)]
pub struct ResponseAggregate {
    id: String,
    state: AggregateState,
    snapshot: Response,
    items: BTreeMap<u32, ItemState>,
    errors: Vec<ErrorEvent>,
}

impl ResponseAggregate {
    fn new(snapshot: Response, state: AggregateState) -> Self {
        Self {
            id: snapshot.id.clone(),
            state,
            snapshot,
            items: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> AggregateState {
        self.state
    }

    pub fn item(&self, output_index: u32) -> Option<&ItemState> {
        self.items.get(&output_index)
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemState> {
        self.items.values()
    }

    /// Upstream error events received while this response was active.
    pub fn errors(&self) -> &[ErrorEvent] {
        &self.errors
    }

    /// Latest lifecycle snapshot as sent by the service.
    pub fn snapshot(&self) -> &Response {
        &self.snapshot
    }

    /// Snapshot metadata with the materialized output items, in output order.
    pub fn to_response(&self) -> Response {
        let mut response = self.snapshot.clone();
        response.output = self.items.values().map(ItemState::materialize).collect();
        let reported_terminal = response.status.map_or(false, |s| s.is_terminal());
        if !reported_terminal || self.state == AggregateState::Cancelled {
            response.status = Some(self.state.status());
        }
        response
    }

    /// Finalized `output_text` parts, in output-index then content-index order.
    pub fn output_text(&self) -> String {
        self.items.values().map(ItemState::finalized_text).collect()
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        let items: Vec<OutputItem> = self
            .items
            .values()
            .filter(|item| item.is_done())
            .map(ItemState::materialize)
            .collect();
        ToolCall::collect(&items)
    }

    fn update_snapshot(&mut self, snapshot: &Response) {
        self.snapshot = snapshot.clone();
    }

    /// Terminal snapshot: fills indices never streamed and replaces items that
    /// did not reach `done`.
    fn merge_terminal(&mut self, snapshot: &Response) {
        for (index, item) in snapshot.output.iter().enumerate() {
            let index = index as u32;
            match self.items.get_mut(&index) {
                Some(state) if state.is_done() => {}
                Some(state) => {
                    state.snapshot = Some(item.clone());
                    state.phase = ItemPhase::Done;
                    if state.item_id.is_none() {
                        state.item_id = item.id().map(str::to_string);
                    }
                }
                None => {
                    self.items.insert(index, ItemState::adopted(index, item.clone()));
                }
            }
        }
        self.update_snapshot(snapshot);
    }
}

/// Aggregates one event stream. Not shared between streams.
#[derive(Debug, Default)]
pub struct ResponseAggregator {
    config: AggregationConfig,
    responses: HashMap<String, ResponseAggregate>,
    active: Option<String>,
    sequence: SequenceGuard,
    history: VecDeque<Diagnostic>,
}

impl ResponseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AggregationConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Applies one event. Never fails: anomalies are reported as diagnostics.
    pub fn apply(&mut self, event: &ResponseStreamEvent) -> AggregationResult {
        let kind = event.kind();
        let sequence = self.sequence.observe(event.sequence_number());
        let mut diagnostics = Vec::new();
        if sequence.is_anomaly() {
            warn!(event = %kind, ?sequence, "sequence anomaly");
            diagnostics.push(Diagnostic::Sequence(sequence));
        }

        let outcome = if let Some(response) = event.response() {
            self.apply_lifecycle(kind, response, &mut diagnostics)
        } else if let ResponseStreamEvent::Error(error) = event {
            warn!(code = ?error.code, param = ?error.param, "{}", error.description());
            if let Some(aggregate) = self.active_mut() {
                aggregate.errors.push(error.clone());
            }
            Outcome::Error(error.clone())
        } else {
            self.apply_scoped(event, &mut diagnostics)
        };

        for diagnostic in &diagnostics {
            if self.config.max_diagnostics == 0 {
                break;
            }
            if self.history.len() == self.config.max_diagnostics {
                self.history.pop_front();
            }
            self.history.push_back(diagnostic.clone());
        }

        AggregationResult {
            outcome,
            sequence,
            diagnostics,
        }
    }

    fn apply_lifecycle(
        &mut self,
        kind: EventKind,
        response: &Response,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Outcome {
        let Some(next) = AggregateState::from_lifecycle(kind) else {
            return Outcome::NoOp;
        };

        if let Some(aggregate) = self.responses.get(&response.id) {
            if aggregate.state.is_terminal() {
                diagnostics.push(Diagnostic::LateEventAfterTerminal {
                    response_id: response.id.clone(),
                    kind,
                });
                return Outcome::NoOp;
            }
        }

        self.active = Some(response.id.clone());
        let aggregate = self
            .responses
            .entry(response.id.clone())
            .or_insert_with(|| {
                debug!(response_id = %response.id, event = %kind, "response aggregate created");
                ResponseAggregate::new(response.clone(), next)
            });

        if next.is_terminal() {
            aggregate.merge_terminal(response);
            aggregate.state = next;
            debug!(response_id = %aggregate.id, state = ?next, "response finalized");
            return Outcome::Finalized(next);
        }

        aggregate.update_snapshot(response);
        // `created`/`queued` never move an aggregate backwards.
        if next == AggregateState::InProgress || aggregate.state == next {
            aggregate.state = next;
        }
        Outcome::Mutated
    }

    fn active_mut(&mut self) -> Option<&mut ResponseAggregate> {
        let id = self.active.as_ref()?;
        self.responses.get_mut(id)
    }

    fn apply_scoped(
        &mut self,
        event: &ResponseStreamEvent,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Outcome {
        let kind = event.kind();
        let verify = self.config.verify_done_text;
        let Some(aggregate) = self.active_mut() else {
            warn!(event = %kind, "event arrived with no active response");
            diagnostics.push(Diagnostic::UnscopedEvent { kind });
            return Outcome::NoOp;
        };

        if aggregate.state.is_terminal() {
            warn!(response_id = %aggregate.id, event = %kind, "late event after terminal state");
            diagnostics.push(Diagnostic::LateEventAfterTerminal {
                response_id: aggregate.id.clone(),
                kind,
            });
            return Outcome::NoOp;
        }

        if matches!(aggregate.state, AggregateState::Created | AggregateState::Queued) {
            debug!(response_id = %aggregate.id, "response in progress");
            aggregate.state = AggregateState::InProgress;
        }

        let mut applier = ScopedApplier {
            items: &mut aggregate.items,
            diagnostics,
            kind,
            verify,
        };
        applier.apply(event)
    }

    /// Marks the active, unfinished response as cancelled. Returns whether one was.
    pub fn cancel(&mut self) -> bool {
        let Some(aggregate) = self.active_mut() else {
            return false;
        };
        if aggregate.state.is_terminal() {
            return false;
        }
        aggregate.state = AggregateState::Cancelled;
        aggregate.snapshot.status = Some(ResponseStatus::Incomplete);
        aggregate.snapshot.incomplete_details = Some(IncompleteDetails {
            reason: Some("cancelled".to_string()),
        });
        debug!(response_id = %aggregate.id, "response cancelled");
        true
    }

    /// Final text of the most recent response, once it is terminal.
    pub fn final_output_text(&self) -> Option<String> {
        self.active_aggregate()
            .filter(|aggregate| aggregate.state.is_terminal())
            .map(ResponseAggregate::output_text)
    }

    pub fn active_aggregate(&self) -> Option<&ResponseAggregate> {
        self.active.as_ref().and_then(|id| self.responses.get(id))
    }

    pub fn aggregate(&self, response_id: &str) -> Option<&ResponseAggregate> {
        self.responses.get(response_id)
    }

    pub fn response_ids(&self) -> impl Iterator<Item = &str> {
        self.responses.keys().map(String::as_str)
    }

    /// Hands a terminal response over to the caller and forgets it.
    pub fn take_finalized(&mut self, response_id: &str) -> Option<Response> {
        if !self.responses.get(response_id)?.state.is_terminal() {
            return None;
        }
        let aggregate = self.responses.remove(response_id)?;
        if self.active.as_deref() == Some(response_id) {
            self.active = None;
        }
        Some(aggregate.to_response())
    }

    /// Retained diagnostics, oldest first.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.history.iter()
    }

    pub fn sequence(&self) -> &SequenceGuard {
        &self.sequence
    }
}

/// Applies one item-scoped event to the items of the active response.
struct ScopedApplier<'a> {
    items: &'a mut BTreeMap<u32, ItemState>,
    diagnostics: &'a mut Vec<Diagnostic>,
    kind: EventKind,
    verify: bool,
}

impl ScopedApplier<'_> {
    fn apply(&mut self, event: &ResponseStreamEvent) -> Outcome {
        use ResponseStreamEvent as E;
        match event {
            E::OutputItemAdded(e) => {
                let scope = Scope::item(e.item.id(), e.output_index);
                let done = self.items.get(&e.output_index).map(ItemState::is_done);
                match done {
                    Some(true) => self.after_done(scope),
                    Some(false) => {
                        if let Some(item) = self.items.get_mut(&e.output_index) {
                            item.snapshot = Some(e.item.clone());
                            if item.item_id.is_none() {
                                item.item_id = e.item.id().map(str::to_string);
                            }
                        }
                        Outcome::Mutated
                    }
                    None => {
                        let mut item = ItemState::new(
                            e.output_index,
                            e.item.id().map(str::to_string),
                            e.item.clone(),
                        );
                        item.snapshot = Some(e.item.clone());
                        self.items.insert(e.output_index, item);
                        Outcome::Mutated
                    }
                }
            }
            E::OutputItemDone(e) => {
                let scope = Scope::item(e.item.id(), e.output_index);
                let item = self.item(e.output_index, e.item.id(), || e.item.clone());
                if item.is_done() {
                    return self.duplicate(scope);
                }
                item.snapshot = Some(e.item.clone());
                item.phase = ItemPhase::Done;
                Outcome::Mutated
            }
            E::ContentPartAdded(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.content_index);
                let item = self.item(e.output_index, Some(&e.item_id), message_item);
                if item.is_done() {
                    return self.after_done(scope);
                }
                item.phase = ItemPhase::Streaming;
                item.parts
                    .entry(e.content_index)
                    .and_modify(|part| part.template = Some(e.part.clone()))
                    .or_insert_with(|| PartState::from_part(&e.part));
                Outcome::Mutated
            }
            E::ContentPartDone(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.content_index);
                let item = self.item(e.output_index, Some(&e.item_id), message_item);
                if item.is_done() {
                    return self.after_done(scope);
                }
                let part = item
                    .parts
                    .entry(e.content_index)
                    .or_insert_with(|| PartState::from_part(&e.part));
                if !part.closes() {
                    return self.duplicate(scope);
                }
                part.template = Some(e.part.clone());
                // A text `done` usually finalized the buffer already.
                let finished = e.part.text().map(|text| (part.text.finish(text), text));
                if let Some((Finish::Done { previous }, text)) = finished {
                    self.check_done_text(scope, previous, text);
                }
                Outcome::Mutated
            }
            E::OutputTextDelta(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.content_index);
                self.push_part(scope, PartKind::OutputText, &e.delta)
            }
            E::RefusalDelta(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.content_index);
                self.push_part(scope, PartKind::Refusal, &e.delta)
            }
            E::OutputTextDone(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.content_index);
                self.finish_part(scope, PartKind::OutputText, &e.text)
            }
            E::RefusalDone(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.content_index);
                self.finish_part(scope, PartKind::Refusal, &e.refusal)
            }
            E::FunctionCallArgumentsDelta(e) | E::McpCallArgumentsDelta(e) => {
                let scope = Scope::item(Some(&e.item_id), e.output_index);
                let fallback = self.call_fallback();
                let item = self.item(e.output_index, Some(&e.item_id), fallback);
                if item.is_done() || !item.arguments.push(&opaque_text(&e.delta)) {
                    return self.after_done(scope);
                }
                item.phase = ItemPhase::Streaming;
                Outcome::Mutated
            }
            E::FunctionCallArgumentsDone(e) | E::McpCallArgumentsDone(e) => {
                let scope = Scope::item(Some(&e.item_id), e.output_index);
                let fallback = self.call_fallback();
                let item = self.item(e.output_index, Some(&e.item_id), fallback);
                if item.is_done() {
                    return self.after_done(scope);
                }
                let authoritative = opaque_text(&e.arguments);
                match item.arguments.finish(&authoritative) {
                    Finish::Duplicate => self.duplicate(scope),
                    Finish::Done { previous } => {
                        self.check_done_text(scope, previous, &authoritative);
                        Outcome::Mutated
                    }
                }
            }
            E::FileSearchCallInProgress(e)
            | E::FileSearchCallSearching(e)
            | E::FileSearchCallCompleted(e)
            | E::WebSearchCallInProgress(e)
            | E::WebSearchCallSearching(e)
            | E::WebSearchCallCompleted(e)
            | E::ImageGenerationCallInProgress(e)
            | E::ImageGenerationCallGenerating(e)
            | E::ImageGenerationCallCompleted(e)
            | E::McpCallInProgress(e)
            | E::McpCallCompleted(e)
            | E::McpCallFailed(e)
            | E::McpListToolsInProgress(e)
            | E::McpListToolsCompleted(e)
            | E::McpListToolsFailed(e) => {
                let scope = Scope::item(Some(&e.item_id), e.output_index);
                let phase = tool_phase(self.kind);
                let fallback = self.call_fallback();
                let item = self.item(e.output_index, Some(&e.item_id), fallback);
                if item.is_done() {
                    return self.after_done(scope);
                }
                item.tool_phase = Some(phase);
                Outcome::Mutated
            }
            E::ImageGenerationCallPartialImage(e) => {
                let scope = Scope::item(Some(&e.item_id), e.output_index);
                let item = self.item(e.output_index, Some(&e.item_id), image_item);
                if item.is_done() {
                    return self.after_done(scope);
                }
                item.tool_phase = Some(ToolCallPhase::Generating);
                item.partial_image = Some(PartialImage {
                    index: e.partial_image_index,
                    b64: e.partial_image_b64.clone(),
                });
                Outcome::Mutated
            }
            E::ReasoningSummaryPartAdded(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.summary_index);
                let item = self.item(e.output_index, Some(&e.item_id), reasoning_item);
                if item.is_done() {
                    return self.after_done(scope);
                }
                item.phase = ItemPhase::Streaming;
                item.summaries
                    .entry(e.summary_index)
                    .or_insert_with(|| PartState::new(PartKind::SummaryText));
                Outcome::Mutated
            }
            E::ReasoningSummaryPartDone(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.summary_index);
                let item = self.item(e.output_index, Some(&e.item_id), reasoning_item);
                if item.is_done() {
                    return self.after_done(scope);
                }
                let part = item
                    .summaries
                    .entry(e.summary_index)
                    .or_insert_with(|| PartState::new(PartKind::SummaryText));
                if !part.closes() {
                    return self.duplicate(scope);
                }
                if let Finish::Done { previous } = part.text.finish(&e.part.text) {
                    self.check_done_text(scope, previous, &e.part.text);
                }
                Outcome::Mutated
            }
            E::ReasoningSummaryTextDelta(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.summary_index);
                self.push_part(scope, PartKind::SummaryText, &e.delta)
            }
            E::ReasoningSummaryDelta(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.summary_index);
                self.push_part(scope, PartKind::SummaryText, &opaque_text(&e.delta))
            }
            E::ReasoningSummaryTextDone(e) | E::ReasoningSummaryDone(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.summary_index);
                self.finish_part(scope, PartKind::SummaryText, &e.text)
            }
            E::OutputTextAnnotationAdded(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.content_index);
                let item = self.item(e.output_index, Some(&e.item_id), message_item);
                if item.is_done() {
                    return self.after_done(scope);
                }
                let created = !item.parts.contains_key(&e.content_index);
                item.parts
                    .entry(e.content_index)
                    .or_insert_with(|| PartState::new(PartKind::OutputText))
                    .annotations
                    .insert(e.annotation_index, e.annotation.clone());
                if created {
                    self.implicit(scope);
                }
                Outcome::Mutated
            }
            E::ReasoningDelta(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.content_index.unwrap_or(0));
                self.push_part(scope, PartKind::ReasoningText, &opaque_text(&e.delta))
            }
            E::ReasoningDone(e) => {
                let scope = Scope::part(&e.item_id, e.output_index, e.content_index.unwrap_or(0));
                self.finish_part(scope, PartKind::ReasoningText, &e.text)
            }
            E::ResponseCreated(_)
            | E::ResponseInProgress(_)
            | E::ResponseCompleted(_)
            | E::ResponseFailed(_)
            | E::ResponseIncomplete(_)
            | E::ResponseQueued(_)
            | E::Error(_) => Outcome::NoOp,
        }
    }

    /// Looks up the item at `output_index`, creating it when it was never announced.
    fn item(
        &mut self,
        output_index: u32,
        item_id: Option<&str>,
        fallback: impl FnOnce() -> OutputItem,
    ) -> &mut ItemState {
        let (kind, diagnostics) = (self.kind, &mut *self.diagnostics);
        self.items.entry(output_index).or_insert_with(|| {
            diagnostics.push(Diagnostic::ImplicitScope {
                kind,
                scope: Scope::item(item_id, output_index),
            });
            let mut fallback = fallback();
            set_item_id(&mut fallback, item_id);
            ItemState::new(output_index, item_id.map(str::to_string), fallback)
        })
    }

    fn call_fallback(&self) -> fn() -> OutputItem {
        match self.kind {
            EventKind::FileSearchCallInProgress
            | EventKind::FileSearchCallSearching
            | EventKind::FileSearchCallCompleted => file_search_item,
            EventKind::WebSearchCallInProgress
            | EventKind::WebSearchCallSearching
            | EventKind::WebSearchCallCompleted => web_search_item,
            EventKind::ImageGenerationCallInProgress
            | EventKind::ImageGenerationCallGenerating
            | EventKind::ImageGenerationCallCompleted => image_item,
            EventKind::McpCallArgumentsDelta
            | EventKind::McpCallArgumentsDone
            | EventKind::McpCallInProgress
            | EventKind::McpCallCompleted
            | EventKind::McpCallFailed => mcp_call_item,
            EventKind::McpListToolsInProgress
            | EventKind::McpListToolsCompleted
            | EventKind::McpListToolsFailed => mcp_list_tools_item,
            _ => function_call_item,
        }
    }

    /// Reasoning summaries live beside content parts, in their own index space.
    fn parts_of(item: &mut ItemState, kind: PartKind) -> &mut BTreeMap<u32, PartState> {
        if kind == PartKind::SummaryText {
            &mut item.summaries
        } else {
            &mut item.parts
        }
    }

    fn push_part(&mut self, scope: Scope, kind: PartKind, fragment: &str) -> Outcome {
        let index = scope.sub_index.unwrap_or(0);
        let item = self.item(scope.output_index, scope.item_id.as_deref(), part_owner(kind));
        if item.is_done() {
            return self.after_done(scope);
        }
        item.phase = ItemPhase::Streaming;
        let parts = Self::parts_of(item, kind);
        let created = !parts.contains_key(&index);
        let part = parts.entry(index).or_insert_with(|| PartState::new(kind));
        if !part.text.push(fragment) {
            return self.after_done(scope);
        }
        if created {
            self.implicit(scope);
        }
        Outcome::Mutated
    }

    fn finish_part(&mut self, scope: Scope, kind: PartKind, text: &str) -> Outcome {
        let index = scope.sub_index.unwrap_or(0);
        let item = self.item(scope.output_index, scope.item_id.as_deref(), part_owner(kind));
        if item.is_done() {
            return self.after_done(scope);
        }
        let parts = Self::parts_of(item, kind);
        let created = !parts.contains_key(&index);
        let part = parts.entry(index).or_insert_with(|| PartState::new(kind));
        match part.text.finish(text) {
            Finish::Duplicate => self.duplicate(scope),
            Finish::Done { previous } => {
                if created {
                    self.implicit(scope.clone());
                }
                self.check_done_text(scope, previous, text);
                Outcome::Mutated
            }
        }
    }

    /// Records a mismatch when deltas were received and disagree with `done`.
    fn check_done_text(&mut self, scope: Scope, accumulated: String, authoritative: &str) {
        if !self.verify || accumulated.is_empty() || accumulated == authoritative {
            return;
        }
        warn!(
            event = %self.kind,
            output_index = scope.output_index,
            accumulated_len = accumulated.len(),
            authoritative_len = authoritative.len(),
            "done value differs from accumulated deltas"
        );
        self.diagnostics.push(Diagnostic::DoneTextMismatch {
            kind: self.kind,
            scope,
            accumulated,
            authoritative: authoritative.to_string(),
        });
    }

    fn after_done(&mut self, scope: Scope) -> Outcome {
        warn!(
            event = %self.kind,
            output_index = scope.output_index,
            "event after scope was finalized"
        );
        self.diagnostics.push(Diagnostic::DeltaAfterDone {
            kind: self.kind,
            scope,
        });
        Outcome::NoOp
    }

    fn duplicate(&mut self, scope: Scope) -> Outcome {
        debug!(event = %self.kind, output_index = scope.output_index, "duplicate done ignored");
        self.diagnostics.push(Diagnostic::DuplicateDone {
            kind: self.kind,
            scope,
        });
        Outcome::NoOp
    }

    fn implicit(&mut self, scope: Scope) {
        self.diagnostics.push(Diagnostic::ImplicitScope {
            kind: self.kind,
            scope,
        });
    }
}

fn tool_phase(kind: EventKind) -> ToolCallPhase {
    match kind {
        EventKind::FileSearchCallSearching | EventKind::WebSearchCallSearching => {
            ToolCallPhase::Searching
        }
        EventKind::ImageGenerationCallGenerating => ToolCallPhase::Generating,
        EventKind::FileSearchCallCompleted
        | EventKind::WebSearchCallCompleted
        | EventKind::ImageGenerationCallCompleted
        | EventKind::McpCallCompleted
        | EventKind::McpListToolsCompleted => ToolCallPhase::Completed,
        EventKind::McpCallFailed | EventKind::McpListToolsFailed => ToolCallPhase::Failed,
        _ => ToolCallPhase::InProgress,
    }
}

/// Text carried by an opaque leaf: strings as-is, an omitted (empty object) leaf
/// as nothing, anything else as its JSON text.
fn opaque_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Object(map) if map.is_empty() => String::new(),
        other => other.to_string(),
    }
}

fn message_item() -> OutputItem {
    OutputItem::Message(MessageItem {
        role: "assistant".to_string(),
        ..Default::default()
    })
}

fn reasoning_item() -> OutputItem {
    OutputItem::Reasoning(ReasoningItem::default())
}

fn image_item() -> OutputItem {
    OutputItem::ImageGenerationCall(ImageGenerationItem::default())
}

fn function_call_item() -> OutputItem {
    OutputItem::FunctionCall(FunctionCallItem::default())
}

fn file_search_item() -> OutputItem {
    OutputItem::FileSearchCall(SearchCallItem::default())
}

fn web_search_item() -> OutputItem {
    OutputItem::WebSearchCall(SearchCallItem::default())
}

fn mcp_call_item() -> OutputItem {
    OutputItem::McpCall(McpCallItem::default())
}

fn mcp_list_tools_item() -> OutputItem {
    OutputItem::McpListTools(McpListToolsItem::default())
}

/// Item shape implied by a text scope of the given kind.
fn part_owner(kind: PartKind) -> fn() -> OutputItem {
    match kind {
        PartKind::ReasoningText | PartKind::SummaryText => reasoning_item,
        PartKind::OutputText | PartKind::Refusal => message_item,
    }
}

fn set_item_id(item: &mut OutputItem, item_id: Option<&str>) {
    let Some(item_id) = item_id else {
        return;
    };
    let slot = match item {
        OutputItem::Message(item) => &mut item.id,
        OutputItem::FunctionCall(item) => &mut item.id,
        OutputItem::FileSearchCall(item) | OutputItem::WebSearchCall(item) => &mut item.id,
        OutputItem::ImageGenerationCall(item) => &mut item.id,
        OutputItem::Reasoning(item) => &mut item.id,
        OutputItem::McpCall(item) => &mut item.id,
        OutputItem::McpListTools(item) => &mut item.id,
        OutputItem::Other { .. } => return,
    };
    if slot.is_none() {
        *slot = Some(item_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_buffer_freezes_on_finish() {
        let mut buffer = TextBuffer::default();
        assert!(buffer.push("Hel"));
        assert!(matches!(
            buffer.finish("Hello"),
            Finish::Done { ref previous } if previous == "Hel"
        ));
        assert!(!buffer.push("!"));
        assert!(matches!(buffer.finish("Hello"), Finish::Duplicate));
        assert_eq!(buffer.as_str(), "Hello");
    }

    #[test]
    fn test_opaque_leaves_render_as_text() {
        assert_eq!(opaque_text(&json!("{\"a\":")), "{\"a\":");
        assert_eq!(opaque_text(&json!({})), "");
        assert_eq!(opaque_text(&json!({"a": 1})), "{\"a\":1}");
        assert_eq!(opaque_text(&Value::Null), "");
    }

    #[test]
    fn test_streamed_part_without_snapshot_is_not_final() {
        let mut item = ItemState::new(0, Some("msg_1".into()), message_item());
        let mut part = PartState::new(PartKind::OutputText);
        part.text.push("partial");
        item.parts.insert(0, part);

        assert_eq!(item.finalized_text(), "");
        let OutputItem::Message(message) = item.materialize() else {
            panic!("expected a message item");
        };
        assert_eq!(message.content[0].text(), Some("partial"));
        assert_eq!(message.status, None);
    }

    #[test]
    fn test_annotations_merge_over_template() {
        let mut part = PartState::from_part(&ContentPart::OutputText(OutputTextPart {
            text: String::new(),
            annotations: vec![json!({"type": "url_citation", "url": "a"})],
            logprobs: None,
        }));
        part.annotations.insert(1, json!({"type": "file_citation"}));

        let ContentPart::OutputText(rendered) = part.to_content_part() else {
            panic!("expected output text");
        };
        assert_eq!(rendered.annotations.len(), 2);
        assert_eq!(rendered.annotations[1]["type"], "file_citation");
    }
}
