use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A parameterization of the survey: string keys mapped to any
/// serializable value, rendered into prompts via `{{ scenario.key }}` or
/// bare `{{ key }}` piping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Field values in declaration order.
    #[serde(default)]
    pub fields: IndexMap<String, Value>,
}

impl Scenario {
    /// Scenario with no fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scenario from key/value pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Self {
        Self {
            name: None,
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Fields as a JSON object in declaration order.
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// An ordered sequence of scenarios.
///
/// The engine treats this as an opaque producer of [`Scenario`] values;
/// pivot/group-by shaping belongs to whatever produced the list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioList(pub Vec<Scenario>);

impl ScenarioList {
    /// List from any scenario iterator.
    pub fn from_list(scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        Self(scenarios.into_iter().collect())
    }

    /// Number of scenarios.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Scenario> {
        self.0.iter()
    }
}

impl IntoIterator for ScenarioList {
    type Item = Scenario;
    type IntoIter = std::vec::IntoIter<Scenario>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<Scenario> for ScenarioList {
    fn from_iter<T: IntoIterator<Item = Scenario>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
