//! Structured-response validation: per-question-type schemas, deterministic
//! repair strategies and canonical normalization.
//!
//! Each question type is described by a [`TypeSpec`] record in a registry
//! keyed on the type tag. Validation never mutates its input; it returns
//! either the normalized answer or a failure with enough context to drive
//! the repair loop. Repair strategies are ordered, deterministic text
//! transformations; the invigilator re-validates every candidate they
//! produce.

mod bm25;
mod log_record;
mod normalize;
mod parse;
mod repair;
mod schema;
mod spec;

pub use bm25::narrow_options;
pub use log_record::{ValidationFailureRecord, ValidationLog};
pub use parse::{ParsedResponse, parse_raw};
pub use repair::repair_candidates;
use serde_json::Value;
pub use spec::{AnswerShape, RepairStrategy, TypeSpec, spec};
use survey::Question;

/// The result of validating one answer against its question.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The answer conforms; carries the normalized form.
    Valid(Value),
    /// The answer does not conform after normalization.
    Invalid {
        /// What class of constraint failed.
        kind: FailureKind,
        /// Human-readable explanation.
        message: String,
        /// The offending data, for the failure log.
        data: Value,
    },
}

impl Outcome {
    /// Whether this outcome is valid.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// The normalized answer, when valid.
    pub fn into_valid(self) -> Option<Value> {
        match self {
            Self::Valid(value) => Some(value),
            Self::Invalid { .. } => None,
        }
    }

    fn invalid(kind: FailureKind, message: impl Into<String>, data: &Value) -> Self {
        Self::Invalid {
            kind,
            message: message.into(),
            data: data.clone(),
        }
    }
}

/// Classes of validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The answer has the wrong structural shape.
    Shape,
    /// The answer is not in the closed option set.
    ClosedSet,
    /// Too few or too many elements.
    Cardinality,
    /// A numeric value is out of range.
    Range,
    /// An allocation does not sum to the declared budget.
    Sum,
    /// A declared key is missing.
    MissingKey,
    /// The answer violates a caller-supplied schema.
    Schema,
}

/// Validate an answer against its question: structural shape, constraints,
/// then normalization. Normalization is idempotent — validating an already
/// valid answer returns it unchanged.
pub fn validate(question: &Question, answer: &Value) -> Outcome {
    schema::validate(question, answer)
}

/// Validate and, on failure, append a record to the log.
pub fn validate_logged(question: &Question, answer: &Value, log: &ValidationLog) -> Outcome {
    let outcome = validate(question, answer);

    if let Outcome::Invalid { kind, message, data } = &outcome {
        log.record(ValidationFailureRecord::new(question, *kind, message, data.clone()));
    }

    outcome
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use survey::Question;

    use super::*;

    #[test]
    fn valid_answers_normalize_idempotently() {
        // One representative answer per shipped type.
        let cases: Vec<(Question, Value)> = vec![
            (Question::free_text("q", "t"), json!("  hello  ")),
            (Question::multiple_choice("q", "t", ["Yes", "No"]), json!("yes")),
            (Question::yes_no("q", "t"), json!("NO")),
            (
                Question::checkbox("q", "t", ["a", "b", "c"]).with_selection_bounds(1, 3),
                json!(["a", "c"]),
            ),
            (Question::numerical("q", "t").with_value_range(0.0, 10.0), json!(7)),
            (
                Question::linear_scale("q", "t", 1, 5).with_labels([(1, "hate"), (5, "love")]),
                json!(4),
            ),
            (Question::list("q", "t"), json!(["x", "y"])),
            (
                Question::dict("q", "t", [("name", survey::ValueKind::String)]),
                json!({ "name": "bo" }),
            ),
            (
                Question::matrix("q", "t", ["row1"], ["col1", "col2"]),
                json!({ "row1": "col1" }),
            ),
            (Question::rank("q", "t", ["a", "b"]), json!(["b", "a"])),
            (
                Question::budget("q", "t", ["a", "b"], 100.0),
                json!({ "a": 40, "b": 60 }),
            ),
        ];

        for (question, answer) in cases {
            let Outcome::Valid(once) = validate(&question, &answer) else {
                panic!("expected valid for {:?} {answer}", question.question_type);
            };
            let Outcome::Valid(twice) = validate(&question, &once) else {
                panic!("normalized answer failed revalidation for {:?}", question.question_type);
            };

            assert_eq!(once, twice, "normalization not idempotent for {:?}", question.question_type);
        }
    }
}
