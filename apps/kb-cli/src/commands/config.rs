//! Configuration management commands

use crate::config::CliConfig;
use crate::ConfigCommands;
use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;

pub async fn run(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show_config(),
        ConfigCommands::Set { key, value } => set_config(&key, &value),
        ConfigCommands::Get { key } => get_config(&key),
        ConfigCommands::Reset { force } => reset_config(force),
    }
}

fn show_config() -> Result<()> {
    let config = CliConfig::load()?;
    let path = CliConfig::config_path()?;

    println!("{}: {}", "Config file".bold(), path.display());
    println!();

    if let Some(url) = &config.api_url {
        println!("{}: {}", "api_url".cyan(), url);
    }
    if let Some(org_id) = &config.org_id {
        println!("{}: {}", "org_id".cyan(), org_id);
    }
    if let Some(workspace_id) = &config.workspace_id {
        println!("{}: {}", "workspace_id".cyan(), workspace_id);
    }
    if let Some(user_id) = &config.user_id {
        println!("{}: {}", "user_id".cyan(), user_id);
    }
    if let Some(role) = &config.role {
        println!("{}: {}", "role".cyan(), role);
    }
    if let Some(format) = &config.output_format {
        println!("{}: {}", "output_format".cyan(), format);
    }

    if !config.custom.is_empty() {
        println!();
        println!("{}", "Custom settings:".bold());
        for (key, value) in &config.custom {
            println!("  {}: {}", key.cyan(), value);
        }
    }

    Ok(())
}

fn set_config(key: &str, value: &str) -> Result<()> {
    let mut config = CliConfig::load()?;
    config.set(key, value.to_string())?;
    config.save()?;
    println!("{} {} = {}", "Set".green(), key.cyan(), value);
    Ok(())
}

fn get_config(key: &str) -> Result<()> {
    let config = CliConfig::load()?;
    match config.get(key) {
        Some(v) => println!("{}", v),
        None => println!("{}", "(not set)".dimmed()),
    }
    Ok(())
}

fn reset_config(force: bool) -> Result<()> {
    if !force {
        let confirmed = Confirm::new()
            .with_prompt("Reset configuration to defaults?")
            .default(false)
            .interact()?;

        if !confirmed {
            println!("{}", "Cancelled.".yellow());
            return Ok(());
        }
    }

    let path = CliConfig::config_path()?;
    if path.exists() {
        std::fs::remove_file(&path)?;
    }

    println!("{} configuration", "Reset".green());
    Ok(())
}
