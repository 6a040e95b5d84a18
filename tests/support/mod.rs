//! Scripted adapters shared by the behavior suites.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use genroute_core::{
    GenerationOutput, GenerationRequest, ImageArtifact, InvokeFuture, MusicTrack, ProviderAdapter,
    ProviderError, ProviderErrorKind, ProviderResponse, TaskSet, TaskType,
};

/// What one `invoke` call does.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(ProviderErrorKind),
    /// Sleeps, then succeeds.
    Stall(Duration),
}

/// Ordered record of `(request tag, provider)` pairs across adapters.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<(String, String)>>>);

impl CallLog {
    pub fn entries(&self) -> Vec<(String, String)> {
        self.0.lock().expect("call log lock").clone()
    }

    pub fn providers_for(&self, tag: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(entry_tag, _)| entry_tag == tag)
            .map(|(_, provider)| provider)
            .collect()
    }

    fn push(&self, tag: String, provider: String) {
        self.0.lock().expect("call log lock").push((tag, provider));
    }
}

pub struct ScriptedAdapter {
    name: String,
    priority: i32,
    tasks: TaskSet,
    script: Mutex<VecDeque<Step>>,
    otherwise: Step,
    reported_cost: Option<u64>,
    estimate: u64,
    calls: AtomicUsize,
    log: Option<CallLog>,
}

impl ScriptedAdapter {
    /// Succeeds on every call for every task.
    pub fn new(name: &str, priority: i32) -> Self {
        Self {
            name: name.to_owned(),
            priority,
            tasks: TaskSet::from_tasks(&TaskType::ALL),
            script: Mutex::new(VecDeque::new()),
            otherwise: Step::Succeed,
            reported_cost: None,
            estimate: 1,
            calls: AtomicUsize::new(0),
            log: None,
        }
    }

    /// Fails with `kind` on every call.
    pub fn failing(name: &str, priority: i32, kind: ProviderErrorKind) -> Self {
        Self::new(name, priority).otherwise(Step::Fail(kind))
    }

    /// Steps played in order before falling back to the default behavior.
    pub fn scripted(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script = Mutex::new(steps.into_iter().collect());
        self
    }

    pub fn otherwise(mut self, step: Step) -> Self {
        self.otherwise = step;
        self
    }

    pub fn with_tasks(mut self, tasks: &[TaskType]) -> Self {
        self.tasks = TaskSet::from_tasks(tasks);
        self
    }

    pub fn reporting_cost(mut self, cost_units: u64) -> Self {
        self.reported_cost = Some(cost_units);
        self
    }

    pub fn estimating(mut self, cost_units: u64) -> Self {
        self.estimate = cost_units;
        self
    }

    pub fn logging_to(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone())
    }

    fn respond(&self, task: TaskType) -> ProviderResponse {
        let response = ProviderResponse::new(output_for(&self.name, task));
        match self.reported_cost {
            Some(cost) => response.with_cost(cost),
            None => response,
        }
    }
}

impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_tasks(&self) -> TaskSet {
        self.tasks
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn estimate_cost(&self, _request: &GenerationRequest) -> u64 {
        self.estimate
    }

    fn invoke<'a>(&'a self, request: &'a GenerationRequest) -> InvokeFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            let tag = request.payload.get_str("tag").unwrap_or_default().to_owned();
            log.push(tag, self.name.clone());
        }
        let step = self.next_step();

        Box::pin(async move {
            match step {
                Step::Succeed => Ok(self.respond(request.task_type)),
                Step::Fail(kind) => Err(error_of(kind, &self.name)),
                Step::Stall(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(self.respond(request.task_type))
                }
            }
        })
    }
}

pub fn error_of(kind: ProviderErrorKind, provider: &str) -> ProviderError {
    match kind {
        ProviderErrorKind::Transient => ProviderError::transient(format!("{provider} unavailable")),
        ProviderErrorKind::Permanent => ProviderError::permanent(format!("{provider} rejected request")),
        ProviderErrorKind::RateLimited => {
            ProviderError::rate_limited(format!("{provider} throttled"), Some(Duration::from_secs(2)))
        }
    }
}

pub fn output_for(provider: &str, task: TaskType) -> GenerationOutput {
    match task {
        TaskType::Text => GenerationOutput::Text {
            text: format!("{provider} text"),
        },
        TaskType::Image => GenerationOutput::Image {
            images: vec![ImageArtifact {
                url: Some(format!("https://{provider}.test/image.png")),
                b64_json: None,
            }],
        },
        TaskType::Speech => GenerationOutput::audio("audio/mpeg", vec![0xFF, 0xFB, 0x90]),
        TaskType::Music => GenerationOutput::Music {
            tracks: vec![MusicTrack {
                id: format!("{provider}-1"),
                audio_url: format!("https://{provider}.test/track.mp3"),
                title: None,
            }],
        },
    }
}
