//! Byte transport for streaming responses.
//!
//! The pipeline only needs an ordered stream of raw byte chunks; [`http::HttpTransport`]
//! is the reqwest-backed source of those chunks.

pub mod http;

pub use http::{HttpTransport, TransportError};
