use async_trait::async_trait;
use config::ApiProviderConfig;
use reqwest::{Client, StatusCode, header::AUTHORIZATION};
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::{
    error::{LlmError, LlmResult},
    http_client::http_client,
    provider::{CallRequest, Provider, RawResponse},
};

const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1";

pub(crate) struct OpenAIProvider {
    client: Client,
    base_url: String,
    name: String,
    config: ApiProviderConfig,
}

impl OpenAIProvider {
    pub fn new(name: String, config: ApiProviderConfig) -> LlmResult<Self> {
        let client = http_client();

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_API_URL.to_string());

        Ok(Self {
            client,
            base_url,
            name,
            config,
        })
    }

    /// Apply a configured rename so aliases resolve to the provider's
    /// actual model name.
    fn resolve_model<'a>(&'a self, model: &'a str) -> &'a str {
        self.config
            .models
            .get(model)
            .and_then(|m| m.rename.as_deref())
            .unwrap_or(model)
    }

    fn api_key(&self) -> LlmResult<&str> {
        self.config
            .api_key
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .ok_or_else(|| LlmError::AuthenticationFailed(format!("No API key configured for provider '{}'", self.name)))
    }

    fn build_body(&self, model: &str, request: &CallRequest) -> Value {
        let mut messages = Vec::new();

        if !request.system_prompt.is_empty() {
            messages.push(json!({ "role": "system", "content": request.system_prompt }));
        }

        messages.push(json!({ "role": "user", "content": request.user_prompt }));

        let mut body = json!({
            "model": model,
            "messages": messages,
        });

        let parameters = &request.parameters;

        if let Some(temperature) = parameters.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = parameters.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(top_p) = parameters.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(frequency_penalty) = parameters.frequency_penalty {
            body["frequency_penalty"] = json!(frequency_penalty);
        }
        if let Some(presence_penalty) = parameters.presence_penalty {
            body["presence_penalty"] = json!(presence_penalty);
        }

        // Native structured output when a schema is attached.
        if let Some(schema) = &request.response_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": { "name": "answer", "schema": schema },
            });
        }

        body
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, model: &str, request: &CallRequest) -> LlmResult<RawResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = self.resolve_model(model);
        let body = self.build_body(model, request);
        let key = self.api_key()?;

        log::debug!("Calling OpenAI-compatible endpoint for model {model}");

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {key}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        if !status.is_success() {
            return Err(map_error(status, &payload));
        }

        parse_response(payload)
    }
}

fn map_error(status: StatusCode, payload: &Value) -> LlmError {
    let message = payload["error"]["message"]
        .as_str()
        .unwrap_or("no error message")
        .to_string();

    match status.as_u16() {
        401 => LlmError::AuthenticationFailed(message),
        403 => LlmError::InsufficientQuota(message),
        404 => LlmError::ModelNotFound(message),
        429 => LlmError::RateLimitExceeded {
            message,
            retry_after: None,
        },
        400 if payload["error"]["code"] == "content_policy_violation" => LlmError::ContentRefused(message),
        400 => LlmError::InvalidRequest(message),
        status => LlmError::ProviderApiError { status, message },
    }
}

fn parse_response(payload: Value) -> LlmResult<RawResponse> {
    let text = payload["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::MalformedResponse("response has no message content".to_string()))?
        .to_string();

    let finish_reason = payload["choices"][0]["finish_reason"].as_str().map(str::to_string);

    if finish_reason.as_deref() == Some("content_filter") {
        return Err(LlmError::ContentRefused("completion stopped by content filter".to_string()));
    }

    Ok(RawResponse {
        input_tokens: payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
        output_tokens: payload["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        provider_model_id: payload["model"].as_str().map(str::to_string),
        finish_reason,
        text,
        raw: payload,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_response;

    #[test]
    fn parses_chat_completion_payload() {
        let payload = json!({
            "model": "gpt-4o-2024-08-06",
            "choices": [{
                "message": { "role": "assistant", "content": "{\"answer\": \"hi\"}" },
                "finish_reason": "stop",
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 5 },
        });

        let response = parse_response(payload).unwrap();

        assert_eq!(response.text, "{\"answer\": \"hi\"}");
        assert_eq!(response.input_tokens, 12);
        assert_eq!(response.output_tokens, 5);
        assert_eq!(response.provider_model_id.as_deref(), Some("gpt-4o-2024-08-06"));
    }

    #[test]
    fn content_filter_is_a_safety_error() {
        let payload = json!({
            "choices": [{
                "message": { "content": "" },
                "finish_reason": "content_filter",
            }],
            "usage": {},
        });

        assert!(matches!(
            parse_response(payload),
            Err(crate::LlmError::ContentRefused(_))
        ));
    }
}
