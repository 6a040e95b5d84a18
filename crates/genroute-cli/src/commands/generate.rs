use std::fs;

use genroute_core::{
    GenerationOutput, GenerationRequest, GenerationResult, Payload, RequestDispatcher, TaskType,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::cli::GenerateArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct GenerateResponse<'a> {
    request_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_file: Option<&'a str>,
    result: &'a GenerationResult,
}

pub async fn run(args: &GenerateArgs, dispatcher: &RequestDispatcher) -> Result<Value, CliError> {
    let request = build_request(args)?;
    let request_id = Uuid::new_v4();
    let span = info_span!("generate", %request_id, task = %request.task_type);

    let result = dispatcher.dispatch(&request).instrument(span).await?;

    let audio_file = match (&result.output, &args.out) {
        (GenerationOutput::Audio { data, .. }, Some(path)) => {
            fs::write(path, data)?;
            info!(%request_id, path = %path.display(), bytes = data.len(), "audio written");
            Some(path.to_string_lossy().into_owned())
        }
        _ => None,
    };

    Ok(serde_json::to_value(GenerateResponse {
        request_id,
        audio_file: audio_file.as_deref(),
        result: &result,
    })?)
}

fn build_request(args: &GenerateArgs) -> Result<GenerationRequest, CliError> {
    let mut payload = Payload::new();
    for raw in &args.params {
        let (key, value) = parse_param(raw)?;
        payload = payload.with(key, value);
    }
    let payload = payload.with(Payload::PROMPT, args.prompt.as_str());

    let mut request = GenerationRequest::new(TaskType::from(args.task), payload)?
        .with_fallback(!args.no_fallback);
    if let Some(max_attempts) = args.max_attempts {
        request = request.with_max_attempts(max_attempts)?;
    }
    if let Some(cost) = args.estimated_cost {
        request = request.with_estimated_cost(cost);
    }
    Ok(request)
}

/// Splits `key=value`. Values that parse as JSON scalars keep their type.
fn parse_param(raw: &str) -> Result<(String, Value), CliError> {
    let (key, value) = raw
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| CliError::InvalidParam(raw.to_owned()))?;

    let value = match serde_json::from_str::<Value>(value) {
        Ok(parsed @ (Value::Bool(_) | Value::Number(_))) => parsed,
        _ => Value::String(value.to_owned()),
    };
    Ok((key.trim().to_owned(), value))
}
