use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sampling parameters. Part of the model identity: two models with the
/// same name but different parameters are different models to the cache
/// and the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelParameters {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Frequency penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    /// Presence penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

/// A model selection: which service, which model, which parameters.
///
/// Equality of `(inference_service, model_name, parameters)` makes two
/// values interchangeable everywhere in the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Provider model name, e.g. `gpt-4o`.
    pub model_name: String,
    /// Service name matching a configured provider, e.g. `openai`.
    pub inference_service: String,
    /// Sampling parameters.
    #[serde(default)]
    pub parameters: ModelParameters,
}

impl Model {
    /// A model on a named service with default parameters.
    pub fn new(inference_service: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            inference_service: inference_service.into(),
            parameters: ModelParameters::default(),
        }
    }

    /// The deterministic test model.
    pub fn test() -> Self {
        Self::new("test", "canned")
    }

    /// Replace the parameters.
    pub fn with_parameters(mut self, parameters: ModelParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.parameters.temperature = Some(temperature);
        self
    }

    /// Set the output token cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.parameters.max_tokens = Some(max_tokens);
        self
    }

    /// Identity string `service/model_name`.
    pub fn identity(&self) -> String {
        format!("{}/{}", self.inference_service, self.model_name)
    }

    /// Parameters as a JSON value with sorted keys.
    pub fn parameters_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.parameters).unwrap_or(serde_json::Value::Null)
    }

    /// Stable hash of the full model identity, for logging and
    /// deduplication.
    pub fn identity_hash(&self) -> String {
        let identity = format!("{}\n{}", self.identity(), self.parameters_json());
        let digest = Sha256::digest(identity.as_bytes());
        let mut hex = String::with_capacity(64);

        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }

        hex
    }
}

#[cfg(test)]
mod tests {
    use super::{Model, ModelParameters};

    #[test]
    fn identity_depends_on_parameters() {
        let base = Model::new("openai", "gpt-4o");
        let hot = base.clone().with_temperature(1.5);

        assert_eq!(base.identity(), "openai/gpt-4o");
        assert_ne!(base.identity_hash(), hot.identity_hash());
        assert_eq!(base.identity_hash(), Model::new("openai", "gpt-4o").identity_hash());
    }

    #[test]
    fn parameters_serialize_sparsely() {
        let parameters = ModelParameters {
            temperature: Some(0.5),
            ..ModelParameters::default()
        };

        assert_eq!(serde_json::to_string(&parameters).unwrap(), r#"{"temperature":0.5}"#);
    }
}
