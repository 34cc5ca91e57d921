use serde::Serialize;

use field_catalog::PublishedData;
use types::DeviceIdentity;

use crate::{ErrorKind, PollError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Setup has not run yet.
    Pending,
    /// The last setup attempt failed; nothing has been published.
    SetupFailed,
    Active,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
    pub at_ms: u64,
}

impl LastError {
    pub fn new(error: &PollError, at_ms: u64) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            at_ms,
        }
    }
}

/// Everything known about one device. Readers get a clone.
#[derive(Debug, Clone, Serialize)]
pub struct PollerState {
    pub identity: DeviceIdentity,
    pub phase: Phase,
    pub published: Option<PublishedData>,
    pub last_error: Option<LastError>,
    pub last_success_ms: Option<u64>,
    pub last_attempt_ms: Option<u64>,
    pub successes: u64,
    pub failures: u64,
    pub skipped: u64,
}

impl PollerState {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            phase: Phase::Pending,
            published: None,
            last_error: None,
            last_success_ms: None,
            last_attempt_ms: None,
            successes: 0,
            failures: 0,
            skipped: 0,
        }
    }

    pub(crate) fn record_success(&mut self, data: PublishedData, at_ms: u64) {
        self.phase = Phase::Active;
        self.published = Some(data);
        self.last_error = None;
        self.last_success_ms = Some(at_ms);
        self.last_attempt_ms = Some(at_ms);
        self.successes = self.successes.saturating_add(1);
    }

    /// Keeps `published` untouched so readers continue to see the last good values.
    pub(crate) fn record_failure(&mut self, error: LastError) {
        if self.phase != Phase::Active {
            self.phase = Phase::SetupFailed;
        }
        self.last_attempt_ms = Some(error.at_ms);
        self.last_error = Some(error);
        self.failures = self.failures.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use field_catalog::Field;
    use types::FieldValue;

    use super::*;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new("10.0.0.2", None)
    }

    #[test]
    fn failure_before_first_success_marks_setup_failed() {
        let mut state = PollerState::new(identity());
        state.record_failure(LastError::new(&PollError::Connection("refused".into()), 5));
        assert_eq!(state.phase, Phase::SetupFailed);
        assert!(state.published.is_none());
        assert_eq!(state.failures, 1);
    }

    #[test]
    fn failure_after_success_keeps_data_and_phase() {
        let mut state = PollerState::new(identity());
        let data: PublishedData = [(Field::GridVoltage, FieldValue::Number(230.1))]
            .into_iter()
            .collect();
        state.record_success(data.clone(), 10);
        state.record_failure(LastError::new(&PollError::Protocol("bad frame".into()), 20));

        assert_eq!(state.phase, Phase::Active);
        assert_eq!(state.published, Some(data));
        assert_eq!(state.last_success_ms, Some(10));
        assert_eq!(state.last_attempt_ms, Some(20));
        assert_eq!(
            state.last_error.as_ref().map(|error| error.kind),
            Some(ErrorKind::Protocol)
        );
    }
}
