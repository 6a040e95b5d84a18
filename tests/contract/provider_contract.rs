//! Contract suite every vendor adapter must satisfy.
//!
//! Each adapter runs against a canned transport so the checks cover request
//! translation and failure classification without network access.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use genroute_core::http_client::{
    HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse, NoopHttpClient,
};
use genroute_core::{
    AdapterSettings, ElevenLabsAdapter, GeminiAdapter, GenerationRequest, OpenAiAdapter, Payload,
    ProviderAdapter, ProviderErrorKind, RateGate, SunoAdapter, TaskType,
};

#[derive(Default)]
struct CannedHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl CannedHttpClient {
    fn with(responses: Vec<Result<HttpResponse, HttpError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl HttpClient for CannedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            self.requests.lock().expect("requests lock").push(request);
            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| Err(HttpError::new("no canned response left")))
        })
    }
}

type Build = fn(Arc<dyn HttpClient>, AdapterSettings) -> Arc<dyn ProviderAdapter>;

struct ProviderCase {
    name: &'static str,
    task: TaskType,
    build: Build,
    settings: fn() -> AdapterSettings,
    success: fn() -> HttpResponse,
    secret_header: (&'static str, &'static str),
}

const SECRET: &str = "contract-secret";

fn provider_cases() -> Vec<ProviderCase> {
    vec![
        ProviderCase {
            name: "openai",
            task: TaskType::Text,
            build: |client, settings| Arc::new(OpenAiAdapter::new(client, SECRET, settings)),
            settings: OpenAiAdapter::default_settings,
            success: || {
                HttpResponse::ok_json(
                    r#"{"choices":[{"message":{"content":"hi"}}],"usage":{"total_tokens":9}}"#,
                )
            },
            secret_header: ("authorization", "Bearer contract-secret"),
        },
        ProviderCase {
            name: "gemini",
            task: TaskType::Text,
            build: |client, settings| Arc::new(GeminiAdapter::new(client, SECRET, settings)),
            settings: GeminiAdapter::default_settings,
            success: || {
                HttpResponse::ok_json(
                    r#"{"candidates":[{"content":{"parts":[{"text":"hi"}]}}],"usageMetadata":{"totalTokenCount":4}}"#,
                )
            },
            secret_header: ("x-goog-api-key", SECRET),
        },
        ProviderCase {
            name: "elevenlabs",
            task: TaskType::Speech,
            build: |client, settings| Arc::new(ElevenLabsAdapter::new(client, SECRET, settings)),
            settings: ElevenLabsAdapter::default_settings,
            success: || HttpResponse::new(200, vec![0xFF_u8, 0xF3, 0x44]).with_header("content-type", "audio/mpeg"),
            secret_header: ("xi-api-key", SECRET),
        },
        ProviderCase {
            name: "suno",
            task: TaskType::Music,
            build: |client, settings| Arc::new(SunoAdapter::new(client, SECRET, settings)),
            settings: SunoAdapter::default_settings,
            success: || {
                HttpResponse::ok_json(
                    r#"{"code":200,"data":[{"id":"s1","audio_url":"https://cdn.test/s1.mp3"}]}"#,
                )
            },
            secret_header: ("authorization", "Bearer contract-secret"),
        },
    ]
}

fn request(task: TaskType) -> GenerationRequest {
    GenerationRequest::new(task, Payload::prompt("contract check")).expect("valid request")
}

async fn invoke_with(
    case: &ProviderCase,
    responses: Vec<Result<HttpResponse, HttpError>>,
) -> (Result<genroute_core::ProviderResponse, genroute_core::ProviderError>, Arc<CannedHttpClient>) {
    let client = CannedHttpClient::with(responses);
    let adapter = (case.build)(client.clone(), (case.settings)());
    let outcome = adapter.invoke(&request(case.task)).await;
    (outcome, client)
}

#[tokio::test]
async fn success_output_matches_task_and_reports_cost() {
    for case in provider_cases() {
        let (outcome, client) = invoke_with(&case, vec![Ok((case.success)())]).await;
        let response = outcome.unwrap_or_else(|error| panic!("{}: {error}", case.name));

        assert_eq!(response.output.task_type(), case.task, "{}: output kind", case.name);
        assert!(response.cost_units.is_some_and(|cost| cost > 0), "{}: cost", case.name);

        let sent = client.requests();
        assert_eq!(sent.len(), 1, "{}: one request per invoke", case.name);
        let (header, value) = case.secret_header;
        assert_eq!(sent[0].headers.get(header).map(String::as_str), Some(value), "{}: auth", case.name);
    }
}

#[tokio::test]
async fn declared_tasks_match_what_invoke_accepts() {
    for case in provider_cases() {
        let adapter = (case.build)(Arc::new(NoopHttpClient), (case.settings)());
        assert_eq!(adapter.name(), case.name);
        assert!(adapter.supported_tasks().supports(case.task), "{}", case.name);

        for task in TaskType::ALL {
            if adapter.supported_tasks().supports(task) {
                continue;
            }
            let error = adapter
                .invoke(&request(task))
                .await
                .expect_err("unsupported task must fail");
            assert_eq!(error.kind(), ProviderErrorKind::Permanent, "{}: {task}", case.name);
        }
    }
}

#[tokio::test]
async fn status_codes_are_classified_consistently() {
    let statuses = [
        (503, ProviderErrorKind::Transient),
        (500, ProviderErrorKind::Transient),
        (408, ProviderErrorKind::Transient),
        (429, ProviderErrorKind::RateLimited),
        (400, ProviderErrorKind::Permanent),
        (401, ProviderErrorKind::Permanent),
        (404, ProviderErrorKind::Permanent),
    ];

    for case in provider_cases() {
        for (status, expected) in statuses {
            let response = HttpResponse::new(status, r#"{"error":{"message":"upstream says no"}}"#);
            let (outcome, _) = invoke_with(&case, vec![Ok(response)]).await;
            let error = outcome.expect_err("non-2xx must fail");
            assert_eq!(error.kind(), expected, "{}: status {status}", case.name);
        }
    }
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    for case in provider_cases() {
        let response = HttpResponse::new(429, "slow down").with_header("Retry-After", "7");
        let (outcome, _) = invoke_with(&case, vec![Ok(response)]).await;
        let error = outcome.expect_err("429 must fail");

        assert_eq!(error.kind(), ProviderErrorKind::RateLimited, "{}", case.name);
        assert_eq!(error.retry_after(), Some(Duration::from_secs(7)), "{}", case.name);
    }
}

#[tokio::test]
async fn transport_failures_follow_retryability() {
    for case in provider_cases() {
        let (outcome, _) = invoke_with(&case, vec![Err(HttpError::new("connection reset"))]).await;
        assert_eq!(
            outcome.expect_err("transport error").kind(),
            ProviderErrorKind::Transient,
            "{}",
            case.name
        );

        let (outcome, _) = invoke_with(&case, vec![Err(HttpError::non_retryable("bad header value"))]).await;
        assert_eq!(
            outcome.expect_err("builder error").kind(),
            ProviderErrorKind::Permanent,
            "{}",
            case.name
        );
    }
}

#[tokio::test]
async fn empty_json_reply_is_permanent() {
    for case in provider_cases() {
        let adapter = (case.build)(Arc::new(NoopHttpClient), (case.settings)());
        let error = adapter
            .invoke(&request(case.task))
            .await
            .expect_err("empty object is not a usable answer");
        assert_eq!(error.kind(), ProviderErrorKind::Permanent, "{}", case.name);
    }
}

#[tokio::test]
async fn api_key_never_appears_in_errors() {
    for case in provider_cases() {
        let response = HttpResponse::new(401, "invalid credentials");
        let (outcome, _) = invoke_with(&case, vec![Ok(response)]).await;
        let error = outcome.expect_err("401");
        assert!(!error.to_string().contains(SECRET), "{}", case.name);
    }
}

#[tokio::test]
async fn exhausted_rate_gate_refuses_without_sending() {
    for case in provider_cases() {
        let gate = RateGate::new(std::num::NonZeroU32::MIN, Duration::from_secs(3_600));
        let client = CannedHttpClient::with(vec![Ok((case.success)()), Ok((case.success)())]);
        let adapter = (case.build)(client.clone(), (case.settings)().with_rate_gate(gate));
        let request = request(case.task);

        adapter.invoke(&request).await.unwrap_or_else(|error| panic!("{}: {error}", case.name));
        let error = adapter.invoke(&request).await.expect_err("gate is exhausted");

        assert_eq!(error.kind(), ProviderErrorKind::RateLimited, "{}", case.name);
        assert!(error.retry_after().is_some(), "{}", case.name);
        assert_eq!(client.requests().len(), 1, "{}: second call never left", case.name);
    }
}
