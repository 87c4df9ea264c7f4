//! Sequence number tracking for one response stream.

use serde::Serialize;

/// Classification of one observed sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SequenceStatus {
    Ok,
    /// Numbers were skipped between the previous event and this one.
    Gap { expected: u64, got: u64 },
    /// The number went backwards.
    Regression { last: u64, got: u64 },
    /// The event carried no sequence number.
    Unknown,
}

impl SequenceStatus {
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Self::Gap { .. } | Self::Regression { .. })
    }
}

/// Tracks the highest sequence number seen so far.
///
/// Anomalies never reject the event; they are reported to the caller. Repeating
/// the last number is accepted since the stream only promises non-decreasing order.
#[derive(Debug, Clone, Default)]
pub struct SequenceGuard {
    last: Option<u64>,
    gaps: u64,
    regressions: u64,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, sequence_number: Option<u64>) -> SequenceStatus {
        let Some(got) = sequence_number else {
            return SequenceStatus::Unknown;
        };

        let status = match self.last {
            None => SequenceStatus::Ok,
            Some(last) if got < last => SequenceStatus::Regression { last, got },
            Some(last) if got <= last.saturating_add(1) => SequenceStatus::Ok,
            Some(last) => SequenceStatus::Gap {
                expected: last + 1,
                got,
            },
        };

        match status {
            SequenceStatus::Gap { .. } => self.gaps += 1,
            SequenceStatus::Regression { .. } => self.regressions += 1,
            _ => {}
        }
        // Keep the running maximum so in-order events after a regression stay clean.
        self.last = Some(self.last.map_or(got, |last| last.max(got)));
        status
    }

    /// Highest sequence number observed.
    pub fn last(&self) -> Option<u64> {
        self.last
    }

    pub fn gap_count(&self) -> u64 {
        self.gaps
    }

    pub fn regression_count(&self) -> u64 {
        self.regressions
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
