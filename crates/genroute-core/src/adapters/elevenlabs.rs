use std::sync::Arc;

use serde_json::json;

use crate::adapters::{audio_body, send, unsupported_task, AdapterSettings};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::{
    GenerationOutput, GenerationRequest, InvokeFuture, ProviderAdapter, ProviderError,
    ProviderResponse, TaskSet, TaskType,
};

const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8Ty2iP";
const DEFAULT_MODEL: &str = "eleven_multilingual_v2";

/// ElevenLabs text-to-speech adapter. Usage is billed per character.
#[derive(Clone)]
pub struct ElevenLabsAdapter {
    settings: AdapterSettings,
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
}

impl ElevenLabsAdapter {
    pub fn default_settings() -> AdapterSettings {
        AdapterSettings::new("elevenlabs", 10, "https://api.elevenlabs.io/v1")
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
                name: String::from("xi-api-key"),
                value: api_key.into(),
            },
        }
    }

    async fn synthesize(&self, request: &GenerationRequest) -> Result<ProviderResponse, ProviderError> {
        let name = &self.settings.name;
        let voice_id = request
            .payload
            .get_str("voice")
            .or(self.settings.voice.as_deref())
            .unwrap_or(DEFAULT_VOICE_ID);
        let body = json!({
            "text": request.prompt(),
            "model_id": self.settings.model.as_deref().unwrap_or(DEFAULT_MODEL),
        });

        let path = format!("text-to-speech/{}", urlencoding::encode(voice_id));
        let http_request = HttpRequest::post_json(self.settings.endpoint(&path), &body)
            .with_header("accept", "audio/mpeg")
            .with_auth(&self.auth);
        let response = send(&self.settings, self.http_client.as_ref(), http_request).await?;
        let (mime_type, audio) = audio_body(name, response, "audio/mpeg")?;

        Ok(ProviderResponse::new(GenerationOutput::audio(mime_type, audio))
            .with_cost(self.estimate_cost(request)))
    }
}

impl ProviderAdapter for ElevenLabsAdapter {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn supported_tasks(&self) -> TaskSet {
        self.settings.effective_tasks(TaskSet::only(TaskType::Speech))
    }

    fn priority(&self) -> i32 {
        self.settings.priority
    }

    fn estimate_cost(&self, request: &GenerationRequest) -> u64 {
        request.prompt().chars().count() as u64
    }

    fn invoke<'a>(&'a self, request: &'a GenerationRequest) -> InvokeFuture<'a> {
        Box::pin(async move {
            match request.task_type {
                TaskType::Speech => self.synthesize(request).await,
                other => Err(unsupported_task(&self.settings.name, other)),
            }
        })
    }
}
