//! Core data types of the Responses streaming protocol.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`events`] | Discriminators and typed streaming events |
//! | [`response`] | Response snapshot, output items and content parts |
//! | [`tool`] | Tool calls extracted from finalized output |

pub mod events;
pub mod response;
pub mod tool;

pub use events::{ErrorEvent, EventKind, ResponseStreamEvent};
pub use response::{ContentPart, OutputItem, Response, ResponseStatus};
pub use tool::ToolCall;
