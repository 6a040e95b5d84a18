use genroute_core::{ProviderSnapshot, RequestDispatcher, TaskType};
use serde::Serialize;
use serde_json::Value;

use crate::cli::ProvidersArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ProviderRow<'a> {
    status: &'static str,
    #[serde(flatten)]
    snapshot: &'a ProviderSnapshot,
}

#[derive(Debug, Serialize)]
struct ProvidersResponse<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    task: Option<TaskType>,
    providers: Vec<ProviderRow<'a>>,
}

pub fn run(args: &ProvidersArgs, dispatcher: &RequestDispatcher) -> Result<Value, CliError> {
    let task = args.task.map(TaskType::from);
    let snapshots = dispatcher.snapshots(task);
    let providers = snapshots
        .iter()
        .map(|snapshot| ProviderRow {
            status: snapshot.status_label(),
            snapshot,
        })
        .collect();

    Ok(serde_json::to_value(ProvidersResponse { task, providers })?)
}
