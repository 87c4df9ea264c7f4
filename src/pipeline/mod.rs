//! Streaming pipeline: raw bytes in, typed events and reconstructed responses out.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Raw Bytes → FrameDecoder → protocol::decode → SequenceGuard + ResponseAggregator
//!     │             │               │                         │
//!   HTTP        SSE framing    ResponseStreamEvent      AggregationResult,
//!                              (or per-frame error)     finalized Response
//! ```
//!
//! Decode failures are local to their frame: [`EventPipeline::process_stream`]
//! yields them as `Err(Error::Decode)` items and keeps going. Transport failures
//! end the stream.
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`decode`] | SSE framing (`SseFrameParser`, `SseDecoder`) |
//! | [`sequence`] | Sequence gap/regression detection |
//! | [`accumulate`] | Incremental response aggregation |
//!
//! ## Example
//!
//! ```rust,no_run
//! use ai_lib_responses::pipeline::EventPipeline;
//! use ai_lib_responses::transport::HttpTransport;
//! use serde_json::json;
//!
//! # async fn run() -> ai_lib_responses::Result<()> {
//! let transport = HttpTransport::new()?;
//! let body = json!({"model": "gpt-4.1", "input": "Hello", "stream": true});
//! let bytes = transport
//!     .open_stream("https://api.openai.com/v1/responses", &body, &[])
//!     .await?;
//!
//! let outcome = EventPipeline::new().collect(bytes, None).await?;
//! println!("{:?}", outcome.final_output_text());
//! # Ok(())
//! # }
//! ```

pub mod accumulate;
pub mod decode;
pub mod sequence;


pub use accumulate::{
    AggregateState, AggregationResult, Diagnostic, Outcome, ResponseAggregate, ResponseAggregator,
    Scope,
};
pub use decode::{SseDecoder, SseFrameParser};
pub use sequence::{SequenceGuard, SequenceStatus};

use crate::client::CancelSignal;
use crate::config::StreamConfig;
use crate::protocol::{self, DecodeError};
use crate::types::events::ResponseStreamEvent;
use crate::types::response::Response;
use crate::{BoxStream, Error, PipeResult, Result};
use futures::StreamExt;
use tracing::{debug, warn};

/// Splits a byte stream into frame payloads.
///
/// Payloads stay raw bytes; text validation happens per frame in
/// [`protocol::decode_bytes`].
#[async_trait::async_trait]
pub trait FrameDecoder: Send + Sync {
    async fn decode_stream(
        &self,
        input: BoxStream<'static, bytes::Bytes>,
    ) -> PipeResult<BoxStream<'static, bytes::Bytes>>;
}

/// Pipeline construction errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub struct PipelineBuilder {
    decoder: Option<Box<dyn FrameDecoder>>,
    config: StreamConfig,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            decoder: None,
            config: StreamConfig::default(),
        }
    }

    pub fn set_decoder(mut self, decoder: Box<dyn FrameDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> std::result::Result<EventPipeline, PipelineError> {
        self.config
            .validate()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let decoder = match self.decoder {
            Some(decoder) => decoder,
            None => Box::new(SseDecoder::new(self.config.decoder.clone())),
        };
        Ok(EventPipeline {
            decoder,
            config: self.config,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of driving one stream to its end (or to cancellation).
#[derive(Debug)]
pub struct StreamOutcome {
    pub aggregator: ResponseAggregator,
    /// Frames that failed to decode; the rest of the stream was still applied.
    pub decode_errors: Vec<DecodeError>,
    pub cancelled: bool,
}

impl StreamOutcome {
    pub fn final_output_text(&self) -> Option<String> {
        self.aggregator.final_output_text()
    }

    /// Takes the most recent response if it reached a terminal state.
    pub fn take_response(&mut self) -> Option<Response> {
        let id = self.aggregator.active_aggregate()?.id().to_string();
        self.aggregator.take_finalized(&id)
    }
}

/// Decodes and aggregates one response stream.
pub struct EventPipeline {
    decoder: Box<dyn FrameDecoder>,
    config: StreamConfig,
}

impl EventPipeline {
    /// SSE framing and aggregation with default settings.
    pub fn new() -> Self {
        let config = StreamConfig::default();
        Self {
            decoder: Box::new(SseDecoder::new(config.decoder.clone())),
            config,
        }
    }

    pub fn from_config(config: StreamConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            decoder: Box::new(SseDecoder::new(config.decoder.clone())),
            config,
        })
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// A fresh aggregator carrying this pipeline's aggregation policy.
    pub fn aggregator(&self) -> ResponseAggregator {
        ResponseAggregator::with_config(self.config.aggregation.clone())
    }

    /// Bytes -> typed events. Undecodable frames, including invalid UTF-8, surface
    /// as `Err(Error::Decode)` and the stream continues.
    pub async fn process_stream(
        &self,
        input: BoxStream<'static, bytes::Bytes>,
    ) -> PipeResult<BoxStream<'static, ResponseStreamEvent>> {
        let frames = self.decoder.decode_stream(input).await?;
        let events = frames.map(|frame| {
            let frame = frame?;
            protocol::decode_bytes(&frame).map_err(|e| {
                warn!(error = %e, tag = ?e.tag(), "dropping undecodable frame");
                Error::Decode(e)
            })
        });
        Ok(Box::pin(events))
    }

    /// Feeds every event to a fresh aggregator, calling `observer` after each one.
    ///
    /// When `cancel` fires, the active response is marked cancelled and the
    /// outcome is returned at once. A transport error discards the partial state.
    pub async fn drive<F>(
        &self,
        input: BoxStream<'static, bytes::Bytes>,
        mut cancel: Option<CancelSignal>,
        mut observer: F,
    ) -> Result<StreamOutcome>
    where
        F: FnMut(&ResponseStreamEvent, &AggregationResult) + Send,
    {
        let mut events = self.process_stream(input).await?;
        let mut aggregator = self.aggregator();
        let mut decode_errors = Vec::new();

        loop {
            let next = match cancel.as_mut() {
                Some(signal) => tokio::select! {
                    biased;
                    _ = signal.cancelled() => {
                        let marked = aggregator.cancel();
                        debug!(marked, "stream cancelled");
                        return Ok(StreamOutcome {
                            aggregator,
                            decode_errors,
                            cancelled: true,
                        });
                    }
                    next = events.next() => next,
                },
                None => events.next().await,
            };

            match next {
                Some(Ok(event)) => {
                    let result = aggregator.apply(&event);
                    observer(&event, &result);
                }
                Some(Err(Error::Decode(e))) => decode_errors.push(e),
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        if aggregator
            .active_aggregate()
            .map_or(false, |aggregate| !aggregate.state().is_terminal())
        {
            warn!("stream ended before the response reached a terminal state");
        }

        Ok(StreamOutcome {
            aggregator,
            decode_errors,
            cancelled: false,
        })
    }

    pub async fn collect(
        &self,
        input: BoxStream<'static, bytes::Bytes>,
        cancel: Option<CancelSignal>,
    ) -> Result<StreamOutcome> {
        self.drive(input, cancel, |_, _| {}).await
    }
}

impl Default for EventPipeline {
    fn default() -> Self {
        Self::new()
    }
}
