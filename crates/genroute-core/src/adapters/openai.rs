use std::sync::Arc;

use serde_json::{json, Value};

use crate::adapters::{audio_body, optional_u64, parse_json, send, unsupported_task, AdapterSettings};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::{
    GenerationOutput, GenerationRequest, ImageArtifact, InvokeFuture, ProviderAdapter,
    ProviderError, ProviderResponse, TaskSet, TaskType,
};

const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
const DEFAULT_SPEECH_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "alloy";
const DEFAULT_MAX_TOKENS: u64 = 512;

/// OpenAI adapter: chat completions, image generations and audio speech.
#[derive(Clone)]
pub struct OpenAiAdapter {
    settings: AdapterSettings,
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
}

impl OpenAiAdapter {
    pub fn default_settings() -> AdapterSettings {
        AdapterSettings::new("openai", 10, "https://api.openai.com/v1")
    }

    pub fn new(
        http_client: Arc<dyn HttpClient>,
        api_key: impl Into<String>,
        settings: AdapterSettings,
    ) -> Self {
        Self {
            settings,
            http_client,
            auth: HttpAuth::BearerToken(api_key.into()),
        }
    }

    async fn complete_text(&self, request: &GenerationRequest) -> Result<ProviderResponse, ProviderError> {
        let name = &self.settings.name;
        let model = request
            .payload
            .get_str("model")
            .or(self.settings.model.as_deref())
            .unwrap_or(DEFAULT_TEXT_MODEL);
        let max_tokens = optional_u64(name, &request.payload, "max_tokens")?
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.payload.get_str("system") {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt()}));

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens,
        });
        if let Some(temperature) = request.payload.get("temperature").and_then(Value::as_f64) {
            body["temperature"] = json!(temperature);
        }

        let http_request =
            HttpRequest::post_json(self.settings.endpoint("chat/completions"), &body).with_auth(&self.auth);
        let response = send(&self.settings, self.http_client.as_ref(), http_request).await?;
        let payload = parse_json(name, &response)?;

        let text = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::permanent(format!("{name} response has no completion text")))?;
        let tokens = payload.pointer("/usage/total_tokens").and_then(Value::as_u64);

        let response = ProviderResponse::new(GenerationOutput::Text {
            text: text.to_owned(),
        });
        Ok(match tokens {
            Some(tokens) => response.with_cost(tokens),
            None => response,
        })
    }

    async fn generate_image(&self, request: &GenerationRequest) -> Result<ProviderResponse, ProviderError> {
        let name = &self.settings.name;
        let count = optional_u64(name, &request.payload, "n")?.unwrap_or(1).max(1);
        let body = json!({
            "model": request
                .payload
                .get_str("model")
                .or(self.settings.model.as_deref())
                .unwrap_or(DEFAULT_IMAGE_MODEL),
            "prompt": request.prompt(),
            "n": count,
            "size": request.payload.get_str("size").unwrap_or("1024x1024"),
        });

        let http_request =
            HttpRequest::post_json(self.settings.endpoint("images/generations"), &body).with_auth(&self.auth);
        let response = send(&self.settings, self.http_client.as_ref(), http_request).await?;
        let payload = parse_json(name, &response)?;

        let images = payload
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| ImageArtifact {
                        url: item.get("url").and_then(Value::as_str).map(str::to_owned),
                        b64_json: item.get("b64_json").and_then(Value::as_str).map(str::to_owned),
                    })
                    .filter(|image| image.url.is_some() || image.b64_json.is_some())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if images.is_empty() {
            return Err(ProviderError::permanent(format!("{name} returned no images")));
        }

        let generated = images.len() as u64;
        Ok(ProviderResponse::new(GenerationOutput::Image { images }).with_cost(generated))
    }

    async fn synthesize_speech(&self, request: &GenerationRequest) -> Result<ProviderResponse, ProviderError> {
        let name = &self.settings.name;
        let voice = request
            .payload
            .get_str("voice")
            .or(self.settings.voice.as_deref())
            .unwrap_or(DEFAULT_VOICE);
        let body = json!({
            "model": request
                .payload
                .get_str("model")
                .or(self.settings.model.as_deref())
                .unwrap_or(DEFAULT_SPEECH_MODEL),
            "input": request.prompt(),
            "voice": voice,
            "response_format": "mp3",
        });

        let http_request =
            HttpRequest::post_json(self.settings.endpoint("audio/speech"), &body).with_auth(&self.auth);
        let response = send(&self.settings, self.http_client.as_ref(), http_request).await?;
        let (mime_type, audio) = audio_body(name, response, "audio/mpeg")?;

        let characters = request.prompt().chars().count() as u64;
        Ok(ProviderResponse::new(GenerationOutput::audio(mime_type, audio)).with_cost(characters))
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn supported_tasks(&self) -> TaskSet {
        self.settings
            .effective_tasks(TaskSet::new(true, true, true, false))
    }

    fn priority(&self) -> i32 {
        self.settings.priority
    }

    fn estimate_cost(&self, request: &GenerationRequest) -> u64 {
        match request.task_type {
            TaskType::Text => {
                let max_tokens = request
                    .payload
                    .get_u64("max_tokens")
                    .ok()
                    .flatten()
                    .unwrap_or(DEFAULT_MAX_TOKENS);
                // Roughly four characters per token for the prompt side.
                (request.prompt().chars().count() as u64)
                    .div_ceil(4)
                    .saturating_add(max_tokens)
            }
            TaskType::Image => request.payload.get_u64("n").ok().flatten().unwrap_or(1).max(1),
            TaskType::Speech => request.prompt().chars().count() as u64,
            TaskType::Music => 0,
        }
    }

    fn invoke<'a>(&'a self, request: &'a GenerationRequest) -> InvokeFuture<'a> {
        Box::pin(async move {
            match request.task_type {
                TaskType::Text => self.complete_text(request).await,
                TaskType::Image => self.generate_image(request).await,
                TaskType::Speech => self.synthesize_speech(request).await,
                TaskType::Music => Err(unsupported_task(&self.settings.name, request.task_type)),
            }
        })
    }
}
