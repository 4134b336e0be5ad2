//! CLI configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// CLI configuration, persisted under the platform config dir so an operator doesn't
/// have to pass `--org-id`/`--workspace-id`/`--user-id` on every invocation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    pub api_url: Option<String>,
    pub org_id: Option<String>,
    pub workspace_id: Option<String>,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub output_format: Option<String>,
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

impl CliConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    pub fn config_path() -> anyhow::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("kb-cli").join("config.toml"))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "api_url" => self.api_url.clone(),
            "org_id" => self.org_id.clone(),
            "workspace_id" => self.workspace_id.clone(),
            "user_id" => self.user_id.clone(),
            "role" => self.role.clone(),
            "output_format" => self.output_format.clone(),
            _ => self.custom.get(key).cloned(),
        }
    }

    pub fn set(&mut self, key: &str, value: String) -> anyhow::Result<()> {
        match key {
            "api_url" => self.api_url = Some(value),
            "org_id" => self.org_id = Some(value),
            "workspace_id" => self.workspace_id = Some(value),
            "user_id" => self.user_id = Some(value),
            "role" => self.role = Some(value),
            "output_format" => self.output_format = Some(value),
            _ => {
                self.custom.insert(key, value);
            }
        }
        Ok(())
    }

    /// Merge CLI flags over the persisted config, falling back to a local default
    /// server. Tenant fields have no safe default -- handlers reject missing headers.
    pub fn with_overrides(&self, api_url: Option<&str>) -> String {
        api_url
            .map(String::from)
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| "http://localhost:8080".to_string())
    }
}
