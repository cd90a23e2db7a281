use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything recorded for one question turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Validated, normalized answer. Null when validation failed.
    pub answer: Value,
    /// Free-form comment from the model, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// The raw textual completion the answer was decoded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_tokens: Option<String>,
    /// Question text as rendered into the prompt.
    pub question_text: String,
    /// Serialized question type tag.
    pub question_type: String,
    /// Option set presented, where applicable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub question_options: Vec<String>,
    /// Rendered user prompt.
    pub user_prompt: String,
    /// Rendered system prompt.
    pub system_prompt: String,
    /// Full raw provider payload.
    #[serde(default)]
    pub raw_model_response: Value,
    /// Cache fingerprint of the underlying call. Empty for turns that
    /// never touched the cache (direct answers, compute questions).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cache_key: String,
    /// Whether the response came from the cache.
    #[serde(default)]
    pub cache_used: bool,
    /// Whether the answer passed validation.
    pub validated: bool,
    /// Prompt tokens billed.
    #[serde(default)]
    pub input_tokens: u64,
    /// Completion tokens billed.
    #[serde(default)]
    pub output_tokens: u64,
    /// Cost of the call in USD.
    #[serde(default)]
    pub cost: f64,
}

/// A per-turn failure attached to the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    /// Question the failure occurred on.
    pub question_name: String,
    /// Failure kind, e.g. `validation`, `template`, `provider:quota`.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

/// One completed interview as an immutable row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Position in the canonical population enumeration.
    pub order: usize,
    /// Iteration this interview ran under.
    pub iteration: u32,
    /// Agent as a JSON object: `{name, traits}`.
    pub agent: Value,
    /// Scenario as a JSON object of its fields.
    pub scenario: Value,
    /// Model as a JSON object: `{model_name, inference_service, parameters}`.
    pub model: Value,
    /// Turn records keyed by question name, in answer order.
    pub turns: IndexMap<String, TurnRecord>,
    /// Failures collected while the interview ran.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<ExceptionRecord>,
}

impl ResultRow {
    /// The value at a dotted column address, or None when absent.
    ///
    /// Addresses follow the column naming of the result table:
    /// `agent.<trait>`, `scenario.<field>`, `model.<field>`,
    /// `answer.<q>`, `comment.<q>`, `question_text.<q>`,
    /// `question_type.<q>`, `question_options.<q>`,
    /// `prompt.<q>_user_prompt`, `prompt.<q>_system_prompt`,
    /// `raw_model_response.<q>`, `generated_tokens.<q>`,
    /// `cache_keys.<q>`, `cache_used.<q>`, `validated.<q>`,
    /// `iteration`, `order`.
    pub fn column(&self, name: &str) -> Option<Value> {
        match name {
            "order" => return Some(Value::from(self.order)),
            "iteration" => return Some(Value::from(self.iteration)),
            _ => {}
        }

        let (prefix, rest) = name.split_once('.')?;

        match prefix {
            "agent" => match rest {
                "name" => self.agent.get("name").cloned(),
                _ => self.agent.get("traits").and_then(|traits| traits.get(rest)).cloned(),
            },
            "scenario" => self.scenario.get(rest).cloned(),
            "model" => self.model.get(rest).cloned(),
            "answer" => self.turns.get(rest).map(|turn| turn.answer.clone()),
            "comment" => self
                .turns
                .get(rest)
                .map(|turn| turn.comment.clone().map(Value::String).unwrap_or(Value::Null)),
            "question_text" => self.turns.get(rest).map(|turn| Value::String(turn.question_text.clone())),
            "question_type" => self.turns.get(rest).map(|turn| Value::String(turn.question_type.clone())),
            "question_options" => self
                .turns
                .get(rest)
                .map(|turn| Value::from(turn.question_options.clone())),
            "raw_model_response" => self.turns.get(rest).map(|turn| turn.raw_model_response.clone()),
            "generated_tokens" => self
                .turns
                .get(rest)
                .map(|turn| turn.generated_tokens.clone().map(Value::String).unwrap_or(Value::Null)),
            "cache_keys" => self.turns.get(rest).map(|turn| Value::String(turn.cache_key.clone())),
            "cache_used" => self.turns.get(rest).map(|turn| Value::Bool(turn.cache_used)),
            "validated" => self.turns.get(rest).map(|turn| Value::Bool(turn.validated)),
            "prompt" => {
                if let Some(question) = rest.strip_suffix("_user_prompt") {
                    self.turns.get(question).map(|turn| Value::String(turn.user_prompt.clone()))
                } else if let Some(question) = rest.strip_suffix("_system_prompt") {
                    self.turns
                        .get(question)
                        .map(|turn| Value::String(turn.system_prompt.clone()))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Every populated column address of this row, in table order.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::new();

        if self.agent.get("name").is_some_and(|name| !name.is_null()) {
            names.push("agent.name".to_string());
        }

        if let Some(Value::Object(traits)) = self.agent.get("traits") {
            names.extend(traits.keys().map(|k| format!("agent.{k}")));
        }

        if let Value::Object(fields) = &self.scenario {
            names.extend(fields.keys().map(|k| format!("scenario.{k}")));
        }

        for field in ["model_name", "inference_service", "parameters"] {
            if self.model.get(field).is_some() {
                names.push(format!("model.{field}"));
            }
        }

        for question in self.turns.keys() {
            names.push(format!("answer.{question}"));
            names.push(format!("comment.{question}"));
            names.push(format!("question_text.{question}"));
            names.push(format!("question_type.{question}"));
            names.push(format!("question_options.{question}"));
            names.push(format!("prompt.{question}_user_prompt"));
            names.push(format!("prompt.{question}_system_prompt"));
            names.push(format!("raw_model_response.{question}"));
            names.push(format!("generated_tokens.{question}"));
            names.push(format!("cache_keys.{question}"));
            names.push(format!("cache_used.{question}"));
            names.push(format!("validated.{question}"));
        }

        names.push("iteration".to_string());
        names.push("order".to_string());

        names
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_row() -> ResultRow {
        let mut turns = IndexMap::new();
        turns.insert(
            "hi".to_string(),
            TurnRecord {
                answer: json!("hello"),
                comment: Some("greeting".to_string()),
                generated_tokens: Some("hello".to_string()),
                question_text: "Say hi.".to_string(),
                question_type: "free_text".to_string(),
                question_options: Vec::new(),
                user_prompt: "Say hi.".to_string(),
                system_prompt: "You are an agent.".to_string(),
                raw_model_response: json!({ "content": "hello" }),
                cache_key: "abc123".to_string(),
                cache_used: false,
                validated: true,
                input_tokens: 10,
                output_tokens: 2,
                cost: 0.0,
            },
        );

        ResultRow {
            order: 3,
            iteration: 0,
            agent: json!({ "name": "alice", "traits": { "age": 30 } }),
            scenario: json!({ "topic": "cats" }),
            model: json!({ "model_name": "canned", "inference_service": "test", "parameters": {} }),
            turns,
            exceptions: Vec::new(),
        }
    }

    #[test]
    fn dotted_column_addressing() {
        let row = sample_row();

        assert_eq!(row.column("agent.age"), Some(json!(30)));
        assert_eq!(row.column("agent.name"), Some(json!("alice")));
        assert_eq!(row.column("scenario.topic"), Some(json!("cats")));
        assert_eq!(row.column("answer.hi"), Some(json!("hello")));
        assert_eq!(row.column("validated.hi"), Some(json!(true)));
        assert_eq!(row.column("prompt.hi_user_prompt"), Some(json!("Say hi.")));
        assert_eq!(row.column("order"), Some(json!(3)));
        assert_eq!(row.column("answer.missing"), None);
    }

    #[test]
    fn row_round_trips() {
        let row = sample_row();
        let json = serde_json::to_string(&row).unwrap();
        let back: ResultRow = serde_json::from_str(&json).unwrap();

        assert_eq!(row, back);
    }
}
