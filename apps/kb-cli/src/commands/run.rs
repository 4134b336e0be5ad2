//! Pipeline run commands: `kb run ...` inspects and controls a `PipelineRun` (C7) by id.

use crate::commands::client::KbClient;
use crate::commands::draft::print_value;
use crate::RunCommands;
use anyhow::Result;
use serde_json::Value;

pub async fn run(client: &KbClient, cmd: RunCommands, format: &str) -> Result<()> {
    match cmd {
        RunCommands::Status { run_id } => {
            let status: Value = client.get(&format!("/kb-pipeline/{run_id}/status")).await?;
            print_value(&status, format)
        }
        RunCommands::Logs { run_id, since } => {
            let path = match since {
                Some(since) => format!("/kb-pipeline/{run_id}/logs?since={since}"),
                None => format!("/kb-pipeline/{run_id}/logs"),
            };
            let logs: Value = client.get(&path).await?;
            print_value(&logs, format)
        }
        RunCommands::Cancel { run_id } => {
            let result: Value = client.post_empty(&format!("/kb-pipeline/{run_id}/cancel")).await?;
            print_value(&result, format)
        }
        RunCommands::Pause { run_id } => {
            let result: Value = client.post_empty(&format!("/kb-pipeline/{run_id}/pause")).await?;
            print_value(&result, format)
        }
        RunCommands::Resume { run_id } => {
            let result: Value = client.post_empty(&format!("/kb-pipeline/{run_id}/resume")).await?;
            print_value(&result, format)
        }
    }
}
