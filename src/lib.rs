//! # ai-lib-responses
//!
//! Streaming event protocol runtime for the Responses API.
//!
//! ## Overview
//!
//! The service pushes a sequence of tag-discriminated JSON events over SSE. This
//! library decodes each frame into a closed set of typed events, tolerates the
//! open-ended leaves of the protocol (argument fragments, annotations, reasoning
//! deltas), tracks sequence numbers, and folds deltas into a complete response.
//!
//! ## Core Philosophy
//!
//! - **Fail loudly per frame**: unknown discriminators are decode errors that keep
//!   the raw tag, but a bad frame never corrupts the rest of the stream
//! - **Done is authoritative**: a `done` value replaces locally accumulated deltas
//! - **Diagnostics, not panics**: gaps, regressions and late events are reported
//!   alongside each aggregation result
//!
//! ## Quick Start
//!
//! ```rust
//! use ai_lib_responses::protocol::decode;
//! use ai_lib_responses::pipeline::ResponseAggregator;
//!
//! let frames = [
//!     r#"{"type":"response.created","response":{"id":"resp_1","status":"in_progress","output":[]},"sequence_number":0}"#,
//!     r#"{"type":"response.output_text.delta","item_id":"msg_1","output_index":0,"content_index":0,"delta":"Hel","sequence_number":1}"#,
//!     r#"{"type":"response.output_text.delta","item_id":"msg_1","output_index":0,"content_index":0,"delta":"lo","sequence_number":2}"#,
//!     r#"{"type":"response.output_text.done","item_id":"msg_1","output_index":0,"content_index":0,"text":"Hello","sequence_number":3}"#,
//!     r#"{"type":"response.completed","response":{"id":"resp_1","status":"completed","output":[]},"sequence_number":4}"#,
//! ];
//!
//! let mut aggregator = ResponseAggregator::new();
//! for frame in frames {
//!     let event = decode(frame)?;
//!     aggregator.apply(&event);
//! }
//! assert_eq!(aggregator.final_output_text().as_deref(), Some("Hello"));
//! # Ok::<(), ai_lib_responses::protocol::DecodeError>(())
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | Frame decoding and decode errors |
//! | [`types`] | Events, response snapshots, tool calls |
//! | [`pipeline`] | SSE framing, sequence guard, aggregation, stream driver |
//! | [`client`] | Cooperative cancellation |
//! | [`transport`] | reqwest byte-stream adapter |
//! | [`config`] | Stream configuration (YAML + environment) |

pub mod client;
pub mod config;
pub mod pipeline;
pub mod protocol;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{cancel_pair, CancelHandle, CancelSignal};
pub use config::StreamConfig;
pub use pipeline::{EventPipeline, ResponseAggregator, StreamOutcome};
pub use protocol::{decode, DecodeError};
pub use types::{
    events::{EventKind, ResponseStreamEvent},
    response::Response,
    tool::ToolCall,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A specialized Result for pipeline operations
pub type PipeResult<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `PipeResult<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = PipeResult<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
