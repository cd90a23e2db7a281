use std::{collections::HashMap, fmt, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Answers, Question, Scenario};

/// Agent-provided short-circuit: answers a question directly, bypassing the
/// model, the cache and the buckets entirely.
pub type DirectAnswerFn = Arc<dyn Fn(&Question, &Scenario, &Answers) -> Value + Send + Sync>;

/// A persona answering the survey: a set of traits plus optional
/// direct-answer functions keyed by question name.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Agent {
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Trait values rendered into the system prompt.
    #[serde(default)]
    pub traits: IndexMap<String, Value>,

    /// Override for the persona presentation template. The default renders
    /// the traits as compact JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits_presentation_template: Option<String>,

    /// Direct answers keyed by question name. Not serialized; functions
    /// only exist in process.
    #[serde(skip)]
    direct_answers: HashMap<String, DirectAnswerFn>,
}

impl Agent {
    /// Agent with no traits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Agent from a trait table.
    pub fn from_traits(traits: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Self {
        Self {
            traits: traits.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..Self::default()
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a single trait.
    pub fn with_trait(mut self, name: impl Into<String>, value: Value) -> Self {
        self.traits.insert(name.into(), value);
        self
    }

    /// Override the persona presentation template.
    pub fn with_presentation_template(mut self, template: impl Into<String>) -> Self {
        self.traits_presentation_template = Some(template.into());
        self
    }

    /// Register a direct answer for a question name.
    pub fn with_direct_answer(
        mut self,
        question_name: impl Into<String>,
        f: impl Fn(&Question, &Scenario, &Answers) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.direct_answers.insert(question_name.into(), Arc::new(f));
        self
    }

    /// Shorthand: a direct answer returning a constant value.
    pub fn answering(self, question_name: impl Into<String>, value: Value) -> Self {
        self.with_direct_answer(question_name, move |_, _, _| value.clone())
    }

    /// The direct-answer function for a question, if registered.
    pub fn direct_answer_for(&self, question_name: &str) -> Option<&DirectAnswerFn> {
        self.direct_answers.get(question_name)
    }

    /// Traits as a JSON object in declaration order.
    pub fn traits_json(&self) -> Value {
        Value::Object(self.traits.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("traits", &self.traits)
            .field("direct_answers", &self.direct_answers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Agent {
    fn eq(&self, other: &Self) -> bool {
        // Direct answers are process-local functions; identity lives in the
        // declarative fields.
        self.name == other.name
            && self.traits == other.traits
            && self.traits_presentation_template == other.traits_presentation_template
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn direct_answer_shorthand() {
        let agent = Agent::new().answering("q1", json!("No"));
        let question = Question::free_text("q1", "anything");
        let scenario = Scenario::new();
        let answers = Answers::new();

        let f = agent.direct_answer_for("q1").unwrap();
        assert_eq!(f(&question, &scenario, &answers), json!("No"));
        assert!(agent.direct_answer_for("q2").is_none());
    }

    #[test]
    fn serialization_skips_functions() {
        let agent = Agent::from_traits([("age", json!(30))])
            .with_name("alice")
            .answering("q1", json!("x"));

        let json = serde_json::to_value(&agent).unwrap();
        assert_eq!(json, json!({ "name": "alice", "traits": { "age": 30 } }));

        let back: Agent = serde_json::from_value(json).unwrap();
        assert_eq!(agent, back);
        assert!(back.direct_answer_for("q1").is_none());
    }
}
