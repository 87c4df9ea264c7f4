use ai_lib_responses::config::AggregationConfig;
use ai_lib_responses::pipeline::accumulate::{ItemPhase, ToolCallPhase};
use ai_lib_responses::pipeline::{
    AggregateState, Diagnostic, Outcome, ResponseAggregator, SequenceStatus,
};
use ai_lib_responses::protocol::decode_value;
use ai_lib_responses::types::events::ResponseStreamEvent;
use ai_lib_responses::types::response::{ContentPart, OutputItem, ResponseStatus};
use serde_json::{json, Value};

fn ev(value: Value) -> ResponseStreamEvent {
    decode_value(value).expect("fixture decodes")
}

fn lifecycle(tag: &str, id: &str, status: &str, output: Value) -> ResponseStreamEvent {
    ev(json!({
        "type": tag,
        "response": {"id": id, "status": status, "model": "gpt-4.1", "output": output}
    }))
}

fn created(id: &str) -> ResponseStreamEvent {
    lifecycle("response.created", id, "in_progress", json!([]))
}

fn completed(id: &str, output: Value) -> ResponseStreamEvent {
    lifecycle("response.completed", id, "completed", output)
}

fn text_delta(fragment: &str) -> ResponseStreamEvent {
    ev(json!({
        "type": "response.output_text.delta",
        "item_id": "msg_1", "output_index": 0, "content_index": 0, "delta": fragment
    }))
}

fn text_done(text: &str) -> ResponseStreamEvent {
    ev(json!({
        "type": "response.output_text.done",
        "item_id": "msg_1", "output_index": 0, "content_index": 0, "text": text
    }))
}

fn message(text: &str) -> Value {
    json!({
        "type": "message", "id": "msg_1", "role": "assistant", "status": "completed",
        "content": [{"type": "output_text", "text": text, "annotations": []}]
    })
}

fn apply_all(aggregator: &mut ResponseAggregator, events: &[ResponseStreamEvent]) {
    for event in events {
        aggregator.apply(event);
    }
}

#[test]
fn test_deltas_then_done_yield_done_text() {
    let mut aggregator = ResponseAggregator::new();
    apply_all(
        &mut aggregator,
        &[created("resp_1"), text_delta("Hel"), text_delta("lo"), text_done("Hello")],
    );
    assert_eq!(aggregator.final_output_text(), None);

    aggregator.apply(&completed("resp_1", json!([])));
    assert_eq!(aggregator.final_output_text().as_deref(), Some("Hello"));
}

#[test]
fn test_done_is_authoritative_over_deltas() {
    let mut aggregator = ResponseAggregator::new();
    apply_all(&mut aggregator, &[created("resp_1"), text_delta("Hel")]);

    let result = aggregator.apply(&text_done("Goodbye"));
    assert_eq!(result.outcome, Outcome::Mutated);
    assert!(result.diagnostics.iter().any(|d| matches!(
        d,
        Diagnostic::DoneTextMismatch { accumulated, authoritative, .. }
            if accumulated == "Hel" && authoritative == "Goodbye"
    )));

    aggregator.apply(&completed("resp_1", json!([])));
    assert_eq!(aggregator.final_output_text().as_deref(), Some("Goodbye"));
}

#[test]
fn test_mismatch_check_can_be_disabled() {
    let mut aggregator = ResponseAggregator::with_config(AggregationConfig {
        verify_done_text: false,
        ..Default::default()
    });
    apply_all(&mut aggregator, &[created("resp_1"), text_delta("Hel")]);
    let result = aggregator.apply(&text_done("Goodbye"));
    assert!(result.diagnostics.is_empty());
}

#[test]
fn test_duplicate_done_is_idempotent() {
    let mut aggregator = ResponseAggregator::new();
    apply_all(&mut aggregator, &[created("resp_1"), text_delta("Hi"), text_done("Hi")]);

    let second = aggregator.apply(&text_done("Hi there"));
    assert_eq!(second.outcome, Outcome::NoOp);
    assert!(matches!(second.diagnostics[..], [Diagnostic::DuplicateDone { .. }]));

    let late_delta = aggregator.apply(&text_delta("!"));
    assert_eq!(late_delta.outcome, Outcome::NoOp);
    assert!(matches!(late_delta.diagnostics[..], [Diagnostic::DeltaAfterDone { .. }]));

    let part = aggregator.active_aggregate().unwrap().item(0).unwrap().part(0).unwrap();
    assert_eq!(part.text().as_str(), "Hi");
}

#[test]
fn test_end_to_end_message_stream() {
    let events = vec![
        created("resp_1"),
        ev(json!({
            "type": "response.output_item.added", "output_index": 0, "sequence_number": 1,
            "item": {"type": "message", "id": "msg_1", "role": "assistant", "status": "in_progress", "content": []}
        })),
        ev(json!({
            "type": "response.content_part.added", "item_id": "msg_1", "output_index": 0,
            "content_index": 0, "sequence_number": 2,
            "part": {"type": "output_text", "text": "", "annotations": []}
        })),
        text_delta("The "),
        text_delta("quick "),
        text_delta("fox"),
        text_done("The quick fox"),
        ev(json!({
            "type": "response.output_item.done", "output_index": 0, "item": message("The quick fox")
        })),
        completed("resp_1", json!([message("The quick fox")])),
    ];

    let mut aggregator = ResponseAggregator::new();
    let mut states = Vec::new();
    for event in &events {
        let result = aggregator.apply(event);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let state = aggregator.active_aggregate().unwrap().state();
        if states.last() != Some(&state) {
            states.push(state);
        }
        if event.kind().is_terminal() {
            assert_eq!(result.outcome, Outcome::Finalized(AggregateState::Completed));
        }
    }

    assert_eq!(
        states,
        vec![AggregateState::Created, AggregateState::InProgress, AggregateState::Completed]
    );
    assert_eq!(aggregator.final_output_text().as_deref(), Some("The quick fox"));

    let response = aggregator.take_finalized("resp_1").unwrap();
    assert_eq!(response.status, Some(ResponseStatus::Completed));
    assert_eq!(response.output.len(), 1);
    let OutputItem::Message(item) = &response.output[0] else {
        panic!("expected a message item");
    };
    assert_eq!(item.content.len(), 1);
    assert_eq!(item.content[0].text(), Some("The quick fox"));

    // Ownership moved to the caller.
    assert!(aggregator.aggregate("resp_1").is_none());
    assert_eq!(aggregator.final_output_text(), None);
}

#[test]
fn test_queued_response_moves_to_in_progress_on_first_delta() {
    let mut aggregator = ResponseAggregator::new();
    let queued = aggregator.apply(&lifecycle("response.queued", "resp_1", "queued", json!([])));
    assert_eq!(queued.outcome, Outcome::Mutated);
    assert_eq!(aggregator.active_aggregate().unwrap().state(), AggregateState::Queued);

    aggregator.apply(&text_delta("Hi"));
    assert_eq!(aggregator.active_aggregate().unwrap().state(), AggregateState::InProgress);

    // A repeated `queued` snapshot does not move the response backwards.
    aggregator.apply(&lifecycle("response.queued", "resp_1", "queued", json!([])));
    assert_eq!(aggregator.active_aggregate().unwrap().state(), AggregateState::InProgress);

    aggregator.apply(&text_done("Hi"));
    let done = aggregator.apply(&completed("resp_1", json!([])));
    assert_eq!(done.outcome, Outcome::Finalized(AggregateState::Completed));
    assert_eq!(aggregator.final_output_text().as_deref(), Some("Hi"));
}

#[test]
fn test_events_after_terminal_are_late() {
    let mut aggregator = ResponseAggregator::new();
    apply_all(&mut aggregator, &[created("resp_1"), completed("resp_1", json!([message("ok")]))]);

    let late = aggregator.apply(&text_delta("more"));
    assert_eq!(late.outcome, Outcome::NoOp);
    assert!(matches!(
        late.diagnostics[..],
        [Diagnostic::LateEventAfterTerminal { ref response_id, .. }] if response_id == "resp_1"
    ));

    let again = aggregator.apply(&completed("resp_1", json!([])));
    assert_eq!(again.outcome, Outcome::NoOp);
    assert!(matches!(again.diagnostics[..], [Diagnostic::LateEventAfterTerminal { .. }]));
    assert_eq!(aggregator.final_output_text().as_deref(), Some("ok"));
}

#[test]
fn test_terminal_snapshot_fills_unstreamed_items() {
    let mut aggregator = ResponseAggregator::new();
    apply_all(&mut aggregator, &[created("resp_1"), text_delta("partial")]);

    aggregator.apply(&completed(
        "resp_1",
        json!([
            message("full text"),
            {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "lookup", "arguments": "{\"q\":1}"}
        ]),
    ));

    // The partial stream never reached `done`, so the snapshot item replaces it.
    assert_eq!(aggregator.final_output_text().as_deref(), Some("full text"));
    let aggregate = aggregator.active_aggregate().unwrap();
    assert_eq!(aggregate.items().count(), 2);
    assert!(aggregate.items().all(|item| item.phase() == ItemPhase::Done));
    assert_eq!(aggregate.tool_calls()[0].arguments, json!({"q": 1}));
}

#[test]
fn test_error_event_has_fallback_description() {
    let mut aggregator = ResponseAggregator::new();
    aggregator.apply(&created("resp_1"));

    let result = aggregator.apply(&ev(json!({"type": "error", "code": "rate_limited"})));
    let Outcome::Error(error) = result.outcome else {
        panic!("expected an error outcome");
    };
    assert_eq!(error.description(), "OpenAI error (rate_limited)");
    assert_eq!(aggregator.active_aggregate().unwrap().errors().len(), 1);

    let bare = aggregator.apply(&ev(json!({"type": "error"})));
    let Outcome::Error(error) = bare.outcome else {
        panic!("expected an error outcome");
    };
    assert!(!error.description().is_empty());
}

#[test]
fn test_function_call_arguments_accumulate() {
    let mut aggregator = ResponseAggregator::new();
    let item = json!({"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "get_weather", "arguments": ""});
    apply_all(
        &mut aggregator,
        &[
            created("resp_1"),
            ev(json!({"type": "response.output_item.added", "output_index": 0, "item": item})),
            ev(json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "output_index": 0, "delta": "{\"city\":"})),
            ev(json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "output_index": 0, "delta": "\"Paris\"}"})),
        ],
    );
    let aggregate = aggregator.active_aggregate().unwrap();
    assert_eq!(aggregate.item(0).unwrap().arguments().as_str(), "{\"city\":\"Paris\"}");
    assert!(aggregate.tool_calls().is_empty());

    apply_all(
        &mut aggregator,
        &[
            ev(json!({"type": "response.function_call_arguments.done", "item_id": "fc_1", "output_index": 0, "arguments": "{\"city\":\"Paris\"}"})),
            ev(json!({"type": "response.output_item.done", "output_index": 0, "item": item})),
            completed("resp_1", json!([])),
        ],
    );

    let calls = aggregator.active_aggregate().unwrap().tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].call_id, "call_1");
    assert_eq!(calls[0].name, "get_weather");
    assert_eq!(calls[0].arguments, json!({"city": "Paris"}));
    assert_eq!(aggregator.final_output_text().as_deref(), Some(""));
}

#[test]
fn test_reasoning_summary_and_tool_progress() {
    let mut aggregator = ResponseAggregator::new();
    apply_all(
        &mut aggregator,
        &[
            created("resp_1"),
            ev(json!({"type": "response.output_item.added", "output_index": 0,
                "item": {"type": "reasoning", "id": "rs_1", "summary": []}})),
            ev(json!({"type": "response.reasoning_summary_part.added", "item_id": "rs_1", "output_index": 0,
                "summary_index": 0, "part": {"type": "summary_text", "text": ""}})),
            ev(json!({"type": "response.reasoning_summary_text.delta", "item_id": "rs_1", "output_index": 0,
                "summary_index": 0, "delta": "Checking "})),
            ev(json!({"type": "response.reasoning_summary_text.delta", "item_id": "rs_1", "output_index": 0,
                "summary_index": 0, "delta": "sources"})),
            ev(json!({"type": "response.reasoning_summary_text.done", "item_id": "rs_1", "output_index": 0,
                "summary_index": 0, "text": "Checking sources"})),
            ev(json!({"type": "response.reasoning_summary_part.done", "item_id": "rs_1", "output_index": 0,
                "summary_index": 0, "part": {"type": "summary_text", "text": "Checking sources"}})),
            ev(json!({"type": "response.web_search_call.searching", "item_id": "ws_1", "output_index": 1})),
        ],
    );

    let aggregate = aggregator.active_aggregate().unwrap();
    let reasoning = aggregate.item(0).unwrap();
    assert_eq!(reasoning.summary(0).unwrap().text().as_str(), "Checking sources");
    let OutputItem::Reasoning(item) = reasoning.materialize() else {
        panic!("expected reasoning");
    };
    assert_eq!(item.summary[0].text, "Checking sources");

    let search = aggregate.item(1).unwrap();
    assert_eq!(search.tool_phase(), Some(ToolCallPhase::Searching));
    let OutputItem::WebSearchCall(call) = search.materialize() else {
        panic!("expected web search");
    };
    assert_eq!(call.id.as_deref(), Some("ws_1"));
    assert_eq!(call.status.as_deref(), Some("searching"));
}

#[test]
fn test_implicit_scopes_are_reported() {
    let mut aggregator = ResponseAggregator::new();
    aggregator.apply(&created("resp_1"));

    let result = aggregator.apply(&text_delta("Hi"));
    assert_eq!(result.outcome, Outcome::Mutated);
    assert_eq!(result.diagnostics.len(), 2);
    assert!(result
        .diagnostics
        .iter()
        .all(|d| matches!(d, Diagnostic::ImplicitScope { .. })));
}

#[test]
fn test_item_event_without_response_is_unscoped() {
    let mut aggregator = ResponseAggregator::new();
    let result = aggregator.apply(&text_delta("orphan"));
    assert_eq!(result.outcome, Outcome::NoOp);
    assert!(matches!(result.diagnostics[..], [Diagnostic::UnscopedEvent { .. }]));
}

#[test]
fn test_cancel_marks_incomplete_never_completed() {
    let mut aggregator = ResponseAggregator::new();
    apply_all(&mut aggregator, &[created("resp_1"), text_delta("half")]);

    assert!(aggregator.cancel());
    assert!(!aggregator.cancel());
    assert_eq!(
        aggregator.active_aggregate().unwrap().state(),
        AggregateState::Cancelled
    );

    let late = aggregator.apply(&completed("resp_1", json!([message("half done")])));
    assert_eq!(late.outcome, Outcome::NoOp);

    // Nothing was finalized by a `done`, so there is no final text.
    assert_eq!(aggregator.final_output_text().as_deref(), Some(""));
    let response = aggregator.take_finalized("resp_1").unwrap();
    assert_eq!(response.status, Some(ResponseStatus::Incomplete));
    assert_eq!(
        response.incomplete_details.and_then(|d| d.reason).as_deref(),
        Some("cancelled")
    );
}

#[test]
fn test_sequence_anomalies_are_attached_to_results() {
    let mut aggregator = ResponseAggregator::new();
    let mut with_seq = |mut value: Value, seq: u64| {
        value["sequence_number"] = json!(seq);
        aggregator.apply(&ev(value))
    };

    let first = with_seq(json!({"type": "response.created", "response": {"id": "r", "output": []}}), 1);
    assert_eq!(first.sequence, SequenceStatus::Ok);
    let gap = with_seq(json!({"type": "response.in_progress", "response": {"id": "r", "output": []}}), 3);
    assert_eq!(gap.sequence, SequenceStatus::Gap { expected: 2, got: 3 });
    assert_eq!(gap.diagnostics, vec![Diagnostic::Sequence(gap.sequence)]);
    // The event is still applied.
    assert_eq!(gap.outcome, Outcome::Mutated);
}

#[test]
fn test_diagnostic_history_is_capped() {
    let mut aggregator = ResponseAggregator::with_config(AggregationConfig {
        max_diagnostics: 2,
        ..Default::default()
    });
    for _ in 0..5 {
        aggregator.apply(&text_delta("orphan"));
    }
    assert_eq!(aggregator.diagnostics().count(), 2);
}

#[test]
fn test_refusal_and_annotations_materialize() {
    let mut aggregator = ResponseAggregator::new();
    apply_all(
        &mut aggregator,
        &[
            created("resp_1"),
            ev(json!({"type": "response.refusal.delta", "item_id": "msg_1", "output_index": 0, "content_index": 1, "delta": "I can't"})),
            ev(json!({"type": "response.refusal.done", "item_id": "msg_1", "output_index": 0, "content_index": 1, "refusal": "I can't help"})),
            text_delta("See"),
            ev(json!({"type": "response.output_text_annotation.added", "item_id": "msg_1", "output_index": 0,
                "content_index": 0, "annotation_index": 0, "annotation": {"type": "url_citation", "url": "https://example.com"}})),
            text_done("See source"),
        ],
    );

    let OutputItem::Message(message) = aggregator.active_aggregate().unwrap().item(0).unwrap().materialize()
    else {
        panic!("expected message");
    };
    let ContentPart::OutputText(text) = &message.content[0] else {
        panic!("expected output text first");
    };
    assert_eq!(text.text, "See source");
    assert_eq!(text.annotations[0]["url"], "https://example.com");
    assert!(matches!(&message.content[1], ContentPart::Refusal(r) if r.refusal == "I can't help"));
}
