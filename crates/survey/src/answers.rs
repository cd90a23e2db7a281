use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One validated answer with its optional comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerCell {
    /// The validated, normalized answer value. `Value::Null` for a turn
    /// that failed validation or was never asked.
    pub answer: Value,
    /// Free-form comment returned alongside the answer, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Answers accumulated while an interview walks the survey, keyed by
/// question name in answer order.
///
/// Rule predicates and prompt piping both read from here; the owning
/// interview is the only writer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Answers {
    cells: IndexMap<String, AnswerCell>,
}

impl Answers {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an answer for a question. Overwrites a prior cell for the
    /// same name; revisiting a question replaces its answer.
    pub fn insert(&mut self, name: impl Into<String>, answer: Value, comment: Option<String>) {
        self.cells.insert(name.into(), AnswerCell { answer, comment });
    }

    /// The cell for a question, if answered.
    pub fn get(&self, name: &str) -> Option<&AnswerCell> {
        self.cells.get(name)
    }

    /// The answer value for a question, if answered.
    pub fn answer(&self, name: &str) -> Option<&Value> {
        self.cells.get(name).map(|cell| &cell.answer)
    }

    /// Whether a question has been answered.
    pub fn contains(&self, name: &str) -> bool {
        self.cells.contains_key(name)
    }

    /// Iterate cells in answer order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnswerCell)> {
        self.cells.iter().map(|(name, cell)| (name.as_str(), cell))
    }

    /// Number of answered questions.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether nothing has been answered yet.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
