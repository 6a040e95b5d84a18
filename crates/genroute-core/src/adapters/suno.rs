use std::sync::Arc;

use serde_json::{json, Value};

use crate::adapters::{optional_u64, parse_json, send, unsupported_task, AdapterSettings};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::{
    GenerationOutput, GenerationRequest, InvokeFuture, MusicTrack, ProviderAdapter, ProviderError,
    ProviderResponse, TaskSet, TaskType,
};

const DEFAULT_MODEL: &str = "V4";

/// Suno music adapter. Charges one unit per returned track.
///
/// Suno gateways answer HTTP 200 and carry the real status in a `code`
/// field, so the body code is classified the same way an HTTP status is.
#[derive(Clone)]
pub struct SunoAdapter {
    settings: AdapterSettings,
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
}

impl SunoAdapter {
    pub fn default_settings() -> AdapterSettings {
        AdapterSettings::new("suno", 10, "https://api.sunoapi.org/api/v1")
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

    async fn compose(&self, request: &GenerationRequest) -> Result<ProviderResponse, ProviderError> {
        let name = &self.settings.name;
        let mut body = json!({
            "prompt": request.prompt(),
            "model": self.settings.model.as_deref().unwrap_or(DEFAULT_MODEL),
            "instrumental": request
                .payload
                .get("instrumental")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        });
        if let Some(style) = request.payload.get_str("style") {
            body["style"] = json!(style);
        }
        if let Some(title) = request.payload.get_str("title") {
            body["title"] = json!(title);
        }
        if let Some(duration) = optional_u64(name, &request.payload, "duration")? {
            body["duration"] = json!(duration);
        }

        let http_request =
            HttpRequest::post_json(self.settings.endpoint("generate"), &body).with_auth(&self.auth);
        let response = send(&self.settings, self.http_client.as_ref(), http_request).await?;
        let payload = parse_json(name, &response)?;

        if let Some(code) = payload.get("code").and_then(Value::as_u64) {
            if code != 200 {
                return Err(body_code_error(name, code, &payload));
            }
        }

        let tracks = payload
            .get("data")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_track).collect::<Vec<_>>())
            .unwrap_or_default();

        if tracks.is_empty() {
            return Err(ProviderError::permanent(format!("{name} returned no tracks")));
        }

        let count = tracks.len() as u64;
        Ok(ProviderResponse::new(GenerationOutput::Music { tracks }).with_cost(count))
    }
}

fn parse_track(item: &Value) -> Option<MusicTrack> {
    Some(MusicTrack {
        id: item.get("id").and_then(Value::as_str)?.to_owned(),
        audio_url: item.get("audio_url").and_then(Value::as_str)?.to_owned(),
        title: item.get("title").and_then(Value::as_str).map(str::to_owned),
    })
}

fn body_code_error(provider: &str, code: u64, payload: &Value) -> ProviderError {
    let detail = payload
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("no detail");
    let message = format!("{provider} reported code {code}: {detail}");

    match code {
        429 => ProviderError::rate_limited(message, None),
        400..=499 => ProviderError::permanent(message),
        _ => ProviderError::transient(message),
    }
}

impl ProviderAdapter for SunoAdapter {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn supported_tasks(&self) -> TaskSet {
        self.settings.effective_tasks(TaskSet::only(TaskType::Music))
    }

    fn priority(&self) -> i32 {
        self.settings.priority
    }

    fn invoke<'a>(&'a self, request: &'a GenerationRequest) -> InvokeFuture<'a> {
        Box::pin(async move {
            match request.task_type {
                TaskType::Music => self.compose(request).await,
                other => Err(unsupported_task(&self.settings.name, other)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::ScriptedHttpClient;
    use crate::http_client::HttpResponse;
    use crate::{Payload, ProviderErrorKind};

    fn adapter(client: Arc<ScriptedHttpClient>) -> SunoAdapter {
        SunoAdapter::new(
            client,
            "suno-key",
            SunoAdapter::default_settings().with_base_url("https://suno.test/api/v1"),
        )
    }

    fn music_request() -> GenerationRequest {
        GenerationRequest::new(
            TaskType::Music,
            Payload::prompt("upbeat intro").with("style", "synthwave").with("duration", 30),
        )
        .expect("valid request")
    }

    #[tokio::test]
    async fn returns_tracks_and_charges_per_track() {
        let client = Arc::new(ScriptedHttpClient::replying(vec![Ok(HttpResponse::ok_json(
            r#"{"code":200,"data":[{"id":"t1","audio_url":"https://cdn.test/t1.mp3","title":"Intro"},{"id":"t2","audio_url":"https://cdn.test/t2.mp3"}]}"#,
        ))]));
        let adapter = adapter(client.clone());

        let response = adapter.invoke(&music_request()).await.expect("music generated");

        match response.output {
            GenerationOutput::Music { tracks } => {
                assert_eq!(tracks.len(), 2);
                assert_eq!(tracks[0].title.as_deref(), Some("Intro"));
            }
            other => panic!("unexpected output: {other:?}"),
        }
        assert_eq!(response.cost_units, Some(2));

        let body: Value =
            serde_json::from_str(client.requests()[0].body.as_deref().expect("json body")).expect("json");
        assert_eq!(body["style"], "synthwave");
        assert_eq!(body["duration"], 30);
    }

    #[test]
    fn estimates_one_generation_per_request() {
        let adapter = adapter(Arc::new(ScriptedHttpClient::default()));
        assert_eq!(adapter.estimate_cost(&music_request()), 1);
    }

    #[tokio::test]
    async fn body_codes_are_classified_like_statuses() {
        let client = Arc::new(ScriptedHttpClient::replying(vec![
            Ok(HttpResponse::ok_json(r#"{"code":429,"msg":"credits exhausted"}"#)),
            Ok(HttpResponse::ok_json(r#"{"code":400,"msg":"prompt too long"}"#)),
            Ok(HttpResponse::ok_json(r#"{"code":500,"msg":"busy"}"#)),
        ]));
        let adapter = adapter(client);
        let request = music_request();

        let limited = adapter.invoke(&request).await.expect_err("429");
        assert_eq!(limited.kind(), ProviderErrorKind::RateLimited);
        let rejected = adapter.invoke(&request).await.expect_err("400");
        assert_eq!(rejected.kind(), ProviderErrorKind::Permanent);
        let busy = adapter.invoke(&request).await.expect_err("500");
        assert_eq!(busy.kind(), ProviderErrorKind::Transient);
    }
}
