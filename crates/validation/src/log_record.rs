//! Append-only log of validation failures for offline analysis.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use survey::Question;

use crate::FailureKind;

/// One validation failure, with enough context to analyze repairs offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFailureRecord {
    /// Serialized type tag of the failing question.
    pub question_type: String,
    /// Name of the failing question.
    pub question_name: String,
    /// Failure class.
    pub error_kind: FailureKind,
    /// Human-readable message.
    pub message: String,
    /// The data that failed validation.
    pub invalid_data: Value,
    /// Wall-clock time of the failure, milliseconds since the epoch.
    pub timestamp_ms: i64,
}

impl ValidationFailureRecord {
    pub(crate) fn new(question: &Question, kind: FailureKind, message: &str, invalid_data: Value) -> Self {
        Self {
            question_type: question.question_type.to_string(),
            question_name: question.question_name.clone(),
            error_kind: kind,
            message: message.to_string(),
            invalid_data,
            timestamp_ms: jiff::Timestamp::now().as_millisecond(),
        }
    }
}

/// In-memory append-only failure log. Shared across interviews; never
/// loss-critical — a full buffer or poisoned lock drops records rather
/// than failing a turn.
#[derive(Debug, Default)]
pub struct ValidationLog {
    records: Mutex<Vec<ValidationFailureRecord>>,
}

impl ValidationLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn record(&self, record: ValidationFailureRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take all records, leaving the log empty.
    pub fn drain(&self) -> Vec<ValidationFailureRecord> {
        self.records.lock().map(|mut records| records.split_off(0)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use survey::Question;

    use crate::{ValidationLog, validate_logged};

    #[test]
    fn failures_are_recorded_and_drained() {
        let log = ValidationLog::new();
        let question = Question::multiple_choice("color", "t", ["red", "blue"]);

        let outcome = validate_logged(&question, &json!("purple"), &log);
        assert!(!outcome.is_valid());
        assert_eq!(log.len(), 1);

        let records = log.drain();
        assert_eq!(records[0].question_name, "color");
        assert_eq!(records[0].question_type, "multiple_choice");
        assert!(log.is_empty());

        // Valid answers leave no trace.
        validate_logged(&question, &json!("red"), &log);
        assert!(log.is_empty());
    }
}
