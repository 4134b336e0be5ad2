//! Command-line argument parsing

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "kb-server",
    about = "Knowledge Base ETL Pipeline server",
    version,
    long_about = "Serves the draft authoring, pipeline run, and KB catalog HTTP surface \
                  over the ingestion/chunking/embedding/indexing pipeline."
)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config/default.toml")]
    pub config: PathBuf,

    /// HTTP server port
    #[arg(short, long, env = "KB_SERVER__PORT", default_value = "8080")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "LOG_LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: String,

    /// Environment (dev, staging, prod)
    #[arg(
        short,
        long,
        env = "ENVIRONMENT",
        default_value = "dev",
        value_parser = ["dev", "staging", "prod"]
    )]
    pub env: String,

    /// Enable JSON log format (useful for production)
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,
}

impl Args {
    /// Validate the arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
