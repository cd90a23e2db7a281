use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Per-question declaration of which prior `(question_text, answer)` pairs
/// appear in the rendered prompt.
///
/// Only declared memories are exposed — there is no implicit
/// full-conversation history. References must point strictly backward;
/// the survey validates this at construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryPlan {
    entries: IndexMap<String, Vec<String>>,
}

impl MemoryPlan {
    /// Empty plan: no question sees any history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `question` sees the `(text, answer)` pair of `prior`.
    /// Repeated declarations keep the first position.
    pub fn add(&mut self, question: impl Into<String>, prior: impl Into<String>) {
        let prior = prior.into();
        let priors = self.entries.entry(question.into()).or_default();

        if !priors.contains(&prior) {
            priors.push(prior);
        }
    }

    /// The declared priors for a question, in declaration order.
    pub fn priors(&self, question: &str) -> &[String] {
        self.entries.get(question).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate all declarations.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(q, priors)| (q.as_str(), priors.as_slice()))
    }

    /// Whether the plan declares anything.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
