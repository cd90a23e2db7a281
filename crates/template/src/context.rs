use std::collections::HashMap;

use serde_json::Value;

use crate::parse::PathStep;

/// Named JSON roots a template renders against.
///
/// The prompt pipeline populates `agent`, `scenario` and one root per
/// answered question (`{name: {"answer": ..., "comment": ...}}`), so
/// `{{ q1.answer }}` is a plain two-step lookup.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    roots: HashMap<String, Value>,
}

impl TemplateContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a root value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.roots.insert(name.into(), value);
    }

    /// Merge every field of a JSON object in as its own root.
    ///
    /// Scenario fields are exposed both nested (`{{ scenario.topic }}`) and
    /// bare (`{{ topic }}`), matching how survey authors write templates.
    pub fn insert_flattened(&mut self, value: &Value) {
        let Value::Object(map) = value else {
            return;
        };

        for (key, value) in map {
            self.roots.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    /// Look up a root by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.roots.get(name)
    }

    pub(crate) fn resolve(&self, path: &[PathStep]) -> Option<&Value> {
        let mut steps = path.iter();

        let PathStep::Key(root) = steps.next()? else {
            return None;
        };

        let mut current = self.roots.get(root)?;

        for step in steps {
            current = match step {
                PathStep::Key(key) => current.get(key)?,
                PathStep::Index(index) => current.get(index)?,
            };
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flatten_exposes_fields_as_roots() {
        let mut context = TemplateContext::new();
        context.insert("topic", json!("existing"));
        context.insert_flattened(&json!({ "topic": "cats", "mood": "sunny" }));

        // Existing roots win over flattened fields.
        assert_eq!(context.get("topic"), Some(&json!("existing")));
        assert_eq!(context.get("mood"), Some(&json!("sunny")));
    }
}
