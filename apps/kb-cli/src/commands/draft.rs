//! Draft commands: `kb draft ...` walks a source through C6's build/preview/finalize
//! lifecycle (SPEC_FULL.md SS4.1-SS4.3) before it becomes a queryable knowledge base.

use crate::commands::client::KbClient;
use crate::DraftCommands;
use anyhow::Result;
use serde_json::{json, Value};

pub async fn run(client: &KbClient, cmd: DraftCommands, format: &str) -> Result<()> {
    match cmd {
        DraftCommands::Create { name, description } => {
            let body = json!({ "name": name, "description": description });
            let draft: Value = client.post("/kb-drafts", &body).await?;
            print_value(&draft, format)
        }
        DraftCommands::AddSource { draft_id, kind, reference, config, tag } => {
            let reference: Value = serde_json::from_str(&reference)?;
            let config: Value = config.map(|c| serde_json::from_str(&c)).transpose()?.unwrap_or(json!({}));
            let body = json!({ "reference": reference, "config": config, "annotations": tag });
            let source: Value = client.post(&format!("/kb-drafts/{draft_id}/sources/{kind}"), &body).await?;
            print_value(&source, format)
        }
        DraftCommands::UpdateSource { draft_id, source_id, reference, config, tag } => {
            let reference = reference.map(|r| serde_json::from_str(&r)).transpose()?;
            let config = config.map(|c| serde_json::from_str(&c)).transpose()?;
            let body = json!({ "reference": reference, "config": config, "annotations": tag });
            let source: Value =
                client.put(&format!("/kb-drafts/{draft_id}/sources/{source_id}"), &body).await?;
            print_value(&source, format)
        }
        DraftCommands::RemoveSource { draft_id, source_id } => {
            let result: Value = client.delete(&format!("/kb-drafts/{draft_id}/sources/{source_id}")).await?;
            print_value(&result, format)
        }
        DraftCommands::SetChunking { draft_id, source_id, strategy, target_size, overlap } => {
            let body = json!({
                "strategy": strategy,
                "target_size": target_size,
                "overlap": overlap,
                "preserve_structure": true,
                "semantic_threshold": 0.75,
                "semantic_delta": 0.2,
            });
            let result: Value =
                client.post(&format!("/kb-drafts/{draft_id}/sources/{source_id}/chunking"), &body).await?;
            print_value(&result, format)
        }
        DraftCommands::Preview { draft_id, source_id } => {
            let path = match source_id {
                Some(id) => format!("/kb-drafts/{draft_id}/preview?source_id={id}"),
                None => format!("/kb-drafts/{draft_id}/preview"),
            };
            let bundle: Value = client.post(&path, &json!({})).await?;
            print_value(&bundle, format)
        }
        DraftCommands::Pages { draft_id, source_id } => {
            let path = match source_id {
                Some(id) => format!("/kb-drafts/{draft_id}/pages?source_id={id}"),
                None => format!("/kb-drafts/{draft_id}/pages"),
            };
            let pages: Value = client.get(&path).await?;
            print_value(&pages, format)
        }
        DraftCommands::Page { draft_id, index } => {
            let page: Value = client.get(&format!("/kb-drafts/{draft_id}/pages/{index}")).await?;
            print_value(&page, format)
        }
        DraftCommands::Chunks { draft_id, source_id, strategy, target_size, overlap } => {
            let mut path = format!("/kb-drafts/{draft_id}/chunks?source_id={source_id}&strategy={strategy}");
            if let Some(target_size) = target_size {
                path.push_str(&format!("&target_size={target_size}"));
            }
            if let Some(overlap) = overlap {
                path.push_str(&format!("&overlap={overlap}"));
            }
            let chunks: Value = client.get(&path).await?;
            print_value(&chunks, format)
        }
        DraftCommands::Finalize { draft_id } => {
            let result: Value = client.post_empty(&format!("/kb-drafts/{draft_id}/finalize")).await?;
            print_value(&result, format)
        }
        DraftCommands::Delete { draft_id } => {
            let result: Value = client.delete(&format!("/kb-drafts/{draft_id}")).await?;
            print_value(&result, format)
        }
    }
}

pub(crate) fn print_value(value: &Value, format: &str) -> Result<()> {
    match format {
        "yaml" => println!("{}", serde_yaml::to_string(value)?),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
