use async_trait::async_trait;
use config::ApiProviderConfig;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::{
    error::{LlmError, LlmResult},
    http_client::http_client,
    provider::{CallRequest, Provider, RawResponse},
};

const DEFAULT_GOOGLE_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub(crate) struct GoogleProvider {
    client: Client,
    base_url: String,
    name: String,
    config: ApiProviderConfig,
}

impl GoogleProvider {
    pub fn new(name: String, config: ApiProviderConfig) -> LlmResult<Self> {
        let client = http_client();

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_GOOGLE_API_URL.to_string());

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

    fn build_body(&self, request: &CallRequest) -> Value {
        let parameters = &request.parameters;
        let mut generation_config = json!({});

        if let Some(temperature) = parameters.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = parameters.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(top_p) = parameters.top_p {
            generation_config["topP"] = json!(top_p);
        }
        if request.response_schema.is_some() {
            generation_config["responseMimeType"] = json!("application/json");
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.user_prompt }] }],
            "generationConfig": generation_config,
        });

        if !request.system_prompt.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": request.system_prompt }] });
        }

        body
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, model: &str, request: &CallRequest) -> LlmResult<RawResponse> {
        let model = self.resolve_model(model);
        let url = format!("{}/models/{model}:generateContent", self.base_url);
        let body = self.build_body(request);
        let key = self.api_key()?;

        log::debug!("Calling Google generateContent for model {model}");

        let response = self
            .client
            .post(&url)
            .query(&[("key", key)])
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
        401 | 403 => LlmError::AuthenticationFailed(message),
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
    let finish_reason = payload["candidates"][0]["finishReason"].as_str().map(str::to_string);

    if finish_reason.as_deref() == Some("SAFETY") {
        return Err(LlmError::ContentRefused("candidate blocked by safety settings".to_string()));
    }

    let text = payload["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .filter(|text| !text.is_empty())
        .ok_or_else(|| LlmError::MalformedResponse("response has no candidate text".to_string()))?;

    Ok(RawResponse {
        input_tokens: payload["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0),
        output_tokens: payload["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0),
        provider_model_id: payload["modelVersion"].as_str().map(str::to_string),
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
    fn parses_generate_content_payload() {
        let payload = json!({
            "modelVersion": "gemini-2.0-flash",
            "candidates": [{
                "content": { "parts": [{ "text": "{\"answer\": \"ok\"}" }] },
                "finishReason": "STOP",
            }],
            "usageMetadata": { "promptTokenCount": 9, "candidatesTokenCount": 4 },
        });

        let response = parse_response(payload).unwrap();

        assert_eq!(response.text, "{\"answer\": \"ok\"}");
        assert_eq!(response.input_tokens, 9);
        assert_eq!(response.output_tokens, 4);
    }

    #[test]
    fn safety_block_is_a_refusal() {
        let payload = json!({
            "candidates": [{ "finishReason": "SAFETY" }],
        });

        assert!(matches!(
            parse_response(payload),
            Err(crate::LlmError::ContentRefused(_))
        ));
    }
}
