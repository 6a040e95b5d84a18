use std::sync::Arc;

use serde_json::{json, Value};

use crate::adapters::{optional_u64, parse_json, send, unsupported_task, AdapterSettings};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::{
    GenerationOutput, GenerationRequest, InvokeFuture, ProviderAdapter, ProviderError,
    ProviderResponse, TaskSet, TaskType,
};

const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_MAX_OUTPUT_TOKENS: u64 = 1024;

/// Google Gemini adapter for text generation via `generateContent`.
#[derive(Clone)]
pub struct GeminiAdapter {
    settings: AdapterSettings,
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
}

impl GeminiAdapter {
    pub fn default_settings() -> AdapterSettings {
        AdapterSettings::new(
            "gemini",
            20,
            "https://generativelanguage.googleapis.com/v1beta",
        )
    }

    pub fn new(
        http_client: Arc<dyn HttpClient>,
        api_key: impl Into<String>,
        settings: AdapterSettings,
    ) -> Self {
        Self {
            settings,
            http_client,
            auth: HttpAuth::Header {
                name: String::from("x-goog-api-key"),
                value: api_key.into(),
            },
        }
    }

    async fn generate_text(&self, request: &GenerationRequest) -> Result<ProviderResponse, ProviderError> {
        let name = &self.settings.name;
        let model = request
            .payload
            .get_str("model")
            .or(self.settings.model.as_deref())
            .unwrap_or(DEFAULT_MODEL);
        let max_output_tokens = optional_u64(name, &request.payload, "max_tokens")?
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);

        let mut generation_config = json!({ "maxOutputTokens": max_output_tokens });
        if let Some(temperature) = request.payload.get("temperature").and_then(Value::as_f64) {
            generation_config["temperature"] = json!(temperature);
        }

        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": request.prompt()}]}],
            "generationConfig": generation_config,
        });
        if let Some(system) = request.payload.get_str("system") {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        let path = format!("models/{}:generateContent", urlencoding::encode(model));
        let http_request = HttpRequest::post_json(self.settings.endpoint(&path), &body).with_auth(&self.auth);
        let response = send(&self.settings, self.http_client.as_ref(), http_request).await?;
        let payload = parse_json(name, &response)?;

        if let Some(reason) = payload
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
        {
            return Err(ProviderError::permanent(format!(
                "{name} blocked the prompt: {reason}"
            )));
        }

        let text = payload
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ProviderError::permanent(format!("{name} response has no candidate text")))?;

        let tokens = payload
            .pointer("/usageMetadata/totalTokenCount")
            .and_then(Value::as_u64);
        let response = ProviderResponse::new(GenerationOutput::Text { text });
        Ok(match tokens {
            Some(tokens) => response.with_cost(tokens),
            None => response,
        })
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn supported_tasks(&self) -> TaskSet {
        self.settings.effective_tasks(TaskSet::only(TaskType::Text))
    }

    fn priority(&self) -> i32 {
        self.settings.priority
    }

    fn estimate_cost(&self, request: &GenerationRequest) -> u64 {
        let max_tokens = request
            .payload
            .get_u64("max_tokens")
            .ok()
            .flatten()
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);
        (request.prompt().chars().count() as u64)
            .div_ceil(4)
            .saturating_add(max_tokens)
    }

    fn invoke<'a>(&'a self, request: &'a GenerationRequest) -> InvokeFuture<'a> {
        Box::pin(async move {
            match request.task_type {
                TaskType::Text => self.generate_text(request).await,
                other => Err(unsupported_task(&self.settings.name, other)),
            }
        })
    }
}
