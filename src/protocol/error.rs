//! Frame decoding errors

/// Classified failure to decode one wire frame.
///
/// A decode error is local to its frame: the caller may keep feeding the
/// aggregator with the following frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("Frame has no `type` discriminator")]
    MissingDiscriminator,

    #[error("Unknown event type '{0}'")]
    UnknownEventType(String),

    #[error("Event '{event}' is missing required field '{field}'")]
    MissingRequiredField { event: String, field: String },

    #[error("Event '{event}' has an invalid payload: {reason}")]
    InvalidPayload { event: String, reason: String },
}

impl DecodeError {
    /// The raw discriminator involved in the failure, when one was read.
    pub fn tag(&self) -> Option<&str> {
        match self {
            DecodeError::UnknownEventType(tag) => Some(tag),
            DecodeError::MissingRequiredField { event, .. }
            | DecodeError::InvalidPayload { event, .. } => Some(event),
            DecodeError::MalformedFrame { .. } | DecodeError::MissingDiscriminator => None,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        DecodeError::MalformedFrame {
            reason: reason.into(),
        }
    }
}
