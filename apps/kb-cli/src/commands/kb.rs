//! Knowledge base commands: `kb kb ...` reads finalized-KB state (C8) -- stats,
//! documents and chunks -- and lets an operator disable a chunk or force a document
//! to reprocess without going through the draft lifecycle again.

use crate::commands::client::KbClient;
use crate::commands::draft::print_value;
use crate::KbCommands;
use anyhow::Result;
use serde_json::{json, Value};

pub async fn run(client: &KbClient, cmd: KbCommands, format: &str) -> Result<()> {
    match cmd {
        KbCommands::Stats { kb_id } => {
            let stats: Value = client.get(&format!("/kbs/{kb_id}/stats")).await?;
            print_value(&stats, format)
        }
        KbCommands::Documents { kb_id, page, limit } => {
            let path = format!("/kbs/{kb_id}/documents?page={page}&limit={limit}");
            let documents: Value = client.get(&path).await?;
            print_value(&documents, format)
        }
        KbCommands::Document { kb_id, document_id } => {
            let document: Value = client.get(&format!("/kbs/{kb_id}/documents/{document_id}")).await?;
            print_value(&document, format)
        }
        KbCommands::AddDocument { kb_id, source_id, uri } => {
            let body = json!({ "source_id": source_id, "uri": uri });
            let document: Value = client.post(&format!("/kbs/{kb_id}/documents"), &body).await?;
            print_value(&document, format)
        }
        KbCommands::Reprocess { kb_id, document_id, uri } => {
            let body = json!({ "uri": uri });
            let document: Value =
                client.put(&format!("/kbs/{kb_id}/documents/{document_id}"), &body).await?;
            print_value(&document, format)
        }
        KbCommands::DeleteDocument { kb_id, document_id } => {
            let result: Value = client.delete(&format!("/kbs/{kb_id}/documents/{document_id}")).await?;
            print_value(&result, format)
        }
        KbCommands::Chunks { kb_id, document_id, page, limit } => {
            let mut path = format!("/kbs/{kb_id}/chunks?page={page}&limit={limit}");
            if let Some(document_id) = document_id {
                path.push_str(&format!("&document_id={document_id}"));
            }
            let chunks: Value = client.get(&path).await?;
            print_value(&chunks, format)
        }
        KbCommands::SetChunkEnabled { kb_id, chunk_id, enabled } => {
            let body = json!({ "enabled": enabled });
            let result: Value =
                client.put(&format!("/kbs/{kb_id}/chunks/{chunk_id}/enabled"), &body).await?;
            print_value(&result, format)
        }
    }
}
