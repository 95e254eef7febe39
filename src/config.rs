use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::location_service::WatchOptions;

const ENV_PREFIX: &str = "GEOVIDEO_";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub endpoint_url: String,
    pub api_key: String,
    pub base_id: String,
    pub table: String,
    // Airtable caps this at 100
    pub page_size: u32,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            endpoint_url: "https://api.airtable.com".to_string(),
            api_key: String::new(),
            base_id: String::new(),
            table: "Videos".to_string(),
            page_size: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    // 0 picks a free port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "localhost".to_string(),
            port: 8080,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub table: TableConfig,
    pub watch: WatchOptions,
    pub server: ServerConfig,
    /// Public read-only view of the table, linked from the page.
    pub shared_view_url: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("invalid config")?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&content)
    }

    /// `GEOVIDEO_*` variables win over whatever is already set.
    pub fn apply_env(mut self) -> Result<Self> {
        self.apply_vars(env::vars())?;
        Ok(self)
    }

    fn apply_vars(&mut self, vars: impl IntoIterator<Item = (String, String)>) -> Result<()> {
        for (key, value) in vars {
            let Some(key) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match key {
                "ENDPOINT_URL" => self.table.endpoint_url = value,
                "API_KEY" => self.table.api_key = value,
                "BASE_ID" => self.table.base_id = value,
                "TABLE" => self.table.table = value,
                "PAGE_SIZE" => {
                    self.table.page_size = value
                        .parse()
                        .with_context(|| format!("invalid {}PAGE_SIZE: {}", ENV_PREFIX, value))?
                }
                "HOST" => self.server.host = value,
                "PORT" => {
                    self.server.port = value
                        .parse()
                        .with_context(|| format!("invalid {}PORT: {}", ENV_PREFIX, value))?
                }
                "SHARED_VIEW_URL" => self.shared_view_url = Some(value),
                "LOG_DIR" => self.log_dir = Some(PathBuf::from(value)),
                _ => warn!("unknown config variable {}{}", ENV_PREFIX, key),
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.table.api_key.is_empty() {
            bail!("missing table service api key");
        }
        if self.table.base_id.is_empty() {
            bail!("missing table service base id");
        }
        if !(1..=100).contains(&self.table.page_size) {
            bail!("page size must be within 1..=100, got {}", self.table.page_size);
        }
        Ok(())
    }
}
