use async_trait::async_trait;
use config::ApiProviderConfig;
use reqwest::{Client, StatusCode, header::HeaderMap};
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::{
    error::{LlmError, LlmResult},
    http_client::default_http_client_builder,
    provider::{CallRequest, Provider, RawResponse},
};

const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub(crate) struct AnthropicProvider {
    client: Client,
    base_url: String,
    name: String,
    config: ApiProviderConfig,
}

impl AnthropicProvider {
    pub fn new(name: String, config: ApiProviderConfig) -> LlmResult<Self> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "anthropic-version",
            ANTHROPIC_VERSION.parse().map_err(|e| {
                log::error!("Failed to parse Anthropic version header: {e}");
                LlmError::InternalError(None)
            })?,
        );

        headers.insert(
            "content-type",
            "application/json".parse().map_err(|e| {
                log::error!("Failed to parse content-type header for Anthropic provider: {e}");
                LlmError::InternalError(None)
            })?,
        );

        let client = default_http_client_builder(headers).build().map_err(|e| {
            log::error!("Failed to create HTTP client for Anthropic provider: {e}");
            LlmError::InternalError(None)
        })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_API_URL.to_string());

        Ok(Self {
            client,
            base_url,
            name,
            config,
        })
    }

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
        let parameters = &request.parameters;

        let mut body = json!({
            "model": model,
            // max_tokens is mandatory for this API.
            "max_tokens": parameters.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [{ "role": "user", "content": request.user_prompt }],
        });

        if !request.system_prompt.is_empty() {
            body["system"] = json!(request.system_prompt);
        }
        if let Some(temperature) = parameters.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = parameters.top_p {
            body["top_p"] = json!(top_p);
        }

        body
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, model: &str, request: &CallRequest) -> LlmResult<RawResponse> {
        let url = format!("{}/messages", self.base_url);
        let model = self.resolve_model(model);
        let body = self.build_body(model, request);
        let key = self.api_key()?;

        log::debug!("Calling Anthropic messages endpoint for model {model}");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", key)
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
        400 => LlmError::InvalidRequest(message),
        status => LlmError::ProviderApiError { status, message },
    }
}

fn parse_response(payload: Value) -> LlmResult<RawResponse> {
    let stop_reason = payload["stop_reason"].as_str().map(str::to_string);

    if stop_reason.as_deref() == Some("refusal") {
        return Err(LlmError::ContentRefused("model refused the request".to_string()));
    }

    let text = payload["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| block["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .filter(|text| !text.is_empty())
        .ok_or_else(|| LlmError::MalformedResponse("response has no text content".to_string()))?;

    Ok(RawResponse {
        input_tokens: payload["usage"]["input_tokens"].as_u64().unwrap_or(0),
        output_tokens: payload["usage"]["output_tokens"].as_u64().unwrap_or(0),
        provider_model_id: payload["model"].as_str().map(str::to_string),
        finish_reason: stop_reason,
        text,
        raw: payload,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_response;

    #[test]
    fn parses_messages_payload() {
        let payload = json!({
            "model": "claude-sonnet-4-20250514",
            "content": [{ "type": "text", "text": "{\"answer\": 5}" }],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 20, "output_tokens": 7 },
        });

        let response = parse_response(payload).unwrap();

        assert_eq!(response.text, "{\"answer\": 5}");
        assert_eq!(response.input_tokens, 20);
        assert_eq!(response.output_tokens, 7);
        assert_eq!(response.finish_reason.as_deref(), Some("end_turn"));
    }
}
