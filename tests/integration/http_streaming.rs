//! Streaming responses over HTTP

use crate::mock_server::MockServerFixture;
use ai_lib_responses::transport::HttpTransport;
use ai_lib_responses::{cancel_pair, Error, EventPipeline};
use serde_json::json;

fn frames() -> Vec<String> {
    vec![
        ": keep-alive".to_string(),
        json!({"type": "response.created", "sequence_number": 0,
            "response": {"id": "resp_1", "status": "in_progress", "output": []}})
        .to_string(),
        json!({"type": "response.output_text.delta", "sequence_number": 1, "item_id": "msg_1",
            "output_index": 0, "content_index": 0, "delta": "Hello"})
        .to_string(),
        json!({"type": "response.output_text.delta", "sequence_number": 2, "item_id": "msg_1",
            "output_index": 0, "content_index": 0, "delta": " World"})
        .to_string(),
        json!({"type": "response.output_text.done", "sequence_number": 3, "item_id": "msg_1",
            "output_index": 0, "content_index": 0, "text": "Hello World"})
        .to_string(),
        json!({"type": "response.completed", "sequence_number": 4,
            "response": {"id": "resp_1", "status": "completed", "output": [
                {"type": "message", "id": "msg_1", "role": "assistant", "status": "completed",
                 "content": [{"type": "output_text", "text": "Hello World", "annotations": []}]}
            ]}})
        .to_string(),
        "data: [DONE]".to_string(),
    ]
}

#[tokio::test]
async fn test_sse_streaming_response() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture.mock_sse_stream("/v1/responses", frames()).await;

    let transport = HttpTransport::new().unwrap();
    let body = json!({"model": "gpt-4.1", "input": "Hi", "stream": true});
    let headers = vec![("authorization".to_string(), "Bearer test".to_string())];
    let bytes = transport
        .open_stream(&fixture.url("/v1/responses"), &body, &headers)
        .await
        .unwrap();

    let mut outcome = EventPipeline::new().collect(bytes, None).await.unwrap();
    mock.assert_async().await;

    assert!(outcome.decode_errors.is_empty());
    assert_eq!(outcome.final_output_text().as_deref(), Some("Hello World"));
    let response = outcome.take_response().unwrap();
    assert_eq!(response.id, "resp_1");
    assert_eq!(response.output.len(), 1);
}

#[tokio::test]
async fn test_rejected_request_surfaces_status_and_body() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_error_response(
            "/v1/responses",
            429,
            r#"{"error":{"message":"Rate limit reached","type":"rate_limit_error"}}"#,
        )
        .await;

    let transport = HttpTransport::new().unwrap();
    let err = transport
        .open_stream(&fixture.url("/v1/responses"), &json!({}), &[])
        .await
        .err()
        .unwrap();

    match err {
        Error::Remote { status, message } => {
            assert_eq!(status, 429);
            assert!(message.contains("Rate limit reached"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_cancel_before_first_frame() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture.mock_sse_stream("/v1/responses", frames()).await;

    let transport = HttpTransport::new().unwrap();
    let bytes = transport
        .open_stream(&fixture.url("/v1/responses"), &json!({}), &[])
        .await
        .unwrap();

    let (handle, signal) = cancel_pair();
    handle.cancel();
    let outcome = EventPipeline::new().collect(bytes, Some(signal)).await.unwrap();

    assert!(outcome.cancelled);
    // Nothing was applied, so there is no response to mark.
    assert!(outcome.aggregator.active_aggregate().is_none());
    assert_eq!(outcome.final_output_text(), None);
}
