//! Version information command

use anyhow::Result;
use colored::Colorize;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn run(format: &str) -> Result<()> {
    match format {
        "json" => {
            println!("{}", serde_json::json!({ "cli_version": VERSION }));
        }
        "yaml" => {
            println!("{}", serde_yaml::to_string(&serde_json::json!({ "cli_version": VERSION }))?);
        }
        _ => {
            println!("{} {}", "kb".cyan().bold(), VERSION.green());
        }
    }

    Ok(())
}
