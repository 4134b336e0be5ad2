//! Operator CLI for the knowledge base ETL pipeline.
//!
//! Talks to `kb-server`'s HTTP surface (SPEC_FULL.md SS6): build a draft, preview its
//! chunking, finalize it into a knowledge base, then inspect the resulting pipeline run
//! and the documents/chunks it produced.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;

use commands::client::{KbClient, TenantHeaders};
use config::CliConfig;

#[derive(Parser)]
#[command(
    name = "kb",
    author,
    version,
    about = "Operator CLI for the knowledge base ETL pipeline",
    long_about = "A command-line interface for building knowledge base drafts, \
                  finalizing them into pipeline runs, and inspecting the resulting \
                  documents and chunks."
)]
struct Cli {
    /// kb-server base URL
    #[arg(short, long, env = "KB_API_URL")]
    api_url: Option<String>,

    /// Org id (tenant header x-org-id)
    #[arg(long, env = "KB_ORG_ID")]
    org_id: Option<String>,

    /// Workspace id (tenant header x-workspace-id)
    #[arg(long, env = "KB_WORKSPACE_ID")]
    workspace_id: Option<String>,

    /// User id (tenant header x-user-id)
    #[arg(long, env = "KB_USER_ID")]
    user_id: Option<String>,

    /// Role (tenant header x-role: viewer, editor, admin, owner)
    #[arg(long, env = "KB_ROLE", default_value = "editor")]
    role: String,

    /// Output format (text, json, yaml)
    #[arg(short, long, default_value = "json", value_parser = ["text", "json", "yaml"])]
    format: String,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage knowledge base drafts (build, preview, finalize)
    #[command(subcommand)]
    Draft(DraftCommands),

    /// Inspect and control pipeline runs
    #[command(subcommand)]
    Run(RunCommands),

    /// Inspect finalized knowledge bases, documents and chunks
    #[command(subcommand)]
    Kb(KbCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Check kb-server connectivity
    Health,

    /// Display version information
    Version,

    /// Generate shell completions
    Completions {
        #[arg(value_parser = ["bash", "zsh", "fish", "powershell"])]
        shell: String,
    },
}

#[derive(Subcommand)]
enum DraftCommands {
    /// Create a new draft
    Create {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Add a source to a draft (kind: web, file, cloud, text, composite)
    AddSource {
        draft_id: String,
        kind: String,
        /// Source-kind-specific reference, as a JSON literal
        #[arg(short, long)]
        reference: String,
        /// Source-kind-specific config, as a JSON literal
        #[arg(short, long)]
        config: Option<String>,
        #[arg(short, long)]
        tag: Vec<String>,
    },
    /// Patch an existing source
    UpdateSource {
        draft_id: String,
        source_id: String,
        #[arg(short, long)]
        reference: Option<String>,
        #[arg(short, long)]
        config: Option<String>,
        #[arg(short, long)]
        tag: Option<Vec<String>>,
    },
    /// Remove a source from a draft
    RemoveSource { draft_id: String, source_id: String },
    /// Override the chunking config for one source
    SetChunking {
        draft_id: String,
        source_id: String,
        #[arg(short, long, default_value = "recursive")]
        strategy: String,
        #[arg(short = 'z', long, default_value = "1000")]
        target_size: usize,
        #[arg(short, long, default_value = "200")]
        overlap: usize,
    },
    /// Preview parsed pages and sample chunks for a draft
    Preview {
        draft_id: String,
        #[arg(short, long)]
        source_id: Option<String>,
    },
    /// List parsed pages for a draft
    Pages {
        draft_id: String,
        #[arg(short, long)]
        source_id: Option<String>,
    },
    /// Show one parsed page by index
    Page { draft_id: String, index: usize },
    /// Sample chunks for one source under a candidate chunking config
    Chunks {
        draft_id: String,
        #[arg(short, long)]
        source_id: String,
        #[arg(short = 'y', long, default_value = "recursive")]
        strategy: String,
        #[arg(short = 'z', long)]
        target_size: Option<usize>,
        #[arg(short, long)]
        overlap: Option<usize>,
    },
    /// Finalize a draft into a knowledge base and start its pipeline run
    Finalize { draft_id: String },
    /// Delete a draft before it's finalized
    Delete { draft_id: String },
}

#[derive(Subcommand)]
enum RunCommands {
    /// Show a pipeline run's state and progress
    Status { run_id: String },
    /// Show a pipeline run's stage event log
    Logs {
        run_id: String,
        #[arg(short, long)]
        since: Option<chrono::DateTime<chrono::Utc>>,
    },
    /// Cancel a running pipeline run
    Cancel { run_id: String },
    /// Pause a running pipeline run
    Pause { run_id: String },
    /// Resume a paused pipeline run
    Resume { run_id: String },
}

#[derive(Subcommand)]
enum KbCommands {
    /// Show document/chunk counts for a knowledge base
    Stats { kb_id: String },
    /// List documents in a knowledge base
    Documents {
        kb_id: String,
        #[arg(short, long, default_value = "1")]
        page: usize,
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Show one document
    Document { kb_id: String, document_id: String },
    /// Register a document directly against a finalized knowledge base
    AddDocument {
        kb_id: String,
        #[arg(short, long)]
        source_id: String,
        #[arg(short, long)]
        uri: String,
    },
    /// Update a document's URI and queue it for reprocessing
    Reprocess {
        kb_id: String,
        document_id: String,
        #[arg(short, long)]
        uri: Option<String>,
    },
    /// Delete a document and its chunks/vectors
    DeleteDocument { kb_id: String, document_id: String },
    /// List chunks in a knowledge base, optionally scoped to one document
    Chunks {
        kb_id: String,
        #[arg(short, long)]
        document_id: Option<String>,
        #[arg(short, long, default_value = "1")]
        page: usize,
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Enable or disable a single chunk without reprocessing
    SetChunkEnabled {
        kb_id: String,
        chunk_id: String,
        #[arg(long)]
        enabled: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set { key: String, value: String },
    /// Get a configuration value
    Get { key: String },
    /// Reset configuration to defaults
    Reset {
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let result = run(cli).await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Config(cmd) = cli.command {
        return commands::config::run(cmd).await;
    }
    if let Commands::Completions { shell } = cli.command {
        return commands::completions::run(&shell);
    }

    let stored = CliConfig::load().unwrap_or_default();
    let api_url = stored.with_overrides(cli.api_url.as_deref());

    if let Commands::Health = cli.command {
        return commands::health::run(&api_url).await;
    }
    if let Commands::Version = cli.command {
        return commands::version::run(&cli.format).await;
    }

    let tenant = TenantHeaders {
        org_id: cli
            .org_id
            .or_else(|| stored.org_id.clone())
            .ok_or_else(|| anyhow::anyhow!("--org-id is required (or set it via `kb config set org_id ...`)"))?,
        workspace_id: cli.workspace_id.or_else(|| stored.workspace_id.clone()).ok_or_else(|| {
            anyhow::anyhow!("--workspace-id is required (or set it via `kb config set workspace_id ...`)")
        })?,
        user_id: cli
            .user_id
            .or_else(|| stored.user_id.clone())
            .ok_or_else(|| anyhow::anyhow!("--user-id is required (or set it via `kb config set user_id ...`)"))?,
        role: cli.role,
    };
    let client = KbClient::new(api_url, tenant);

    match cli.command {
        Commands::Draft(cmd) => commands::draft::run(&client, cmd, &cli.format).await,
        Commands::Run(cmd) => commands::run::run(&client, cmd, &cli.format).await,
        Commands::Kb(cmd) => commands::kb::run(&client, cmd, &cli.format).await,
        Commands::Config(_) | Commands::Completions { .. } | Commands::Health | Commands::Version => {
            unreachable!("handled above")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }
}
