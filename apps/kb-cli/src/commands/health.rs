//! Health check command

use anyhow::Result;
use colored::Colorize;
use serde_json::Value;

pub async fn run(api_url: &str) -> Result<()> {
    let http = reqwest::Client::new();
    let response = http.get(format!("{}/health", api_url.trim_end_matches('/'))).send().await?;
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if status.is_success() {
        println!("{}: {}", "Status".bold(), "Healthy".green());
    } else {
        println!("{}: {}", "Status".bold(), "Unreachable".red());
    }
    println!("{}: {}", "Server".bold(), api_url);
    if body != Value::Null {
        println!("{}: {}", "Response".bold(), body);
    }

    Ok(())
}
