//! Integration tests against a mock HTTP server

mod http_streaming;
mod mock_server;
