use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::Level;

use crate::logging::parse_level;

pub const DEFAULT_API_HOST: &str = "127.0.0.1";
pub const DEFAULT_API_PORT: u16 = 18080;
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

/// Optional `config.toml` in the data directory. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub api_host: Option<String>,
    pub api_port: Option<u16>,
    pub backend_url: Option<String>,
    pub api_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub api_host: String,
    pub api_port: u16,
    pub backend_url: String,
    /// Gateway root URL used by the client commands.
    pub api_url: String,
    pub log_level: Level,
}

/// `MEVCHAT_DATA_DIR`, else `~/.mevchat`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MEVCHAT_DATA_DIR")
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mevchat")
}

impl Settings {
    pub fn load() -> Result<Self> {
        let data_dir = data_dir();
        let file = read_file_config(&data_dir.join("config.toml"))?;
        Ok(Self::resolve(data_dir, file, |key| std::env::var(key).ok()))
    }

    /// Layer defaults, the config file and the environment, in that order.
    pub fn resolve(
        data_dir: PathBuf,
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let env = |key: &str| env(key).filter(|v| !v.is_empty());

        let api_host = file
            .api_host
            .unwrap_or_else(|| DEFAULT_API_HOST.to_string());
        let api_port = file.api_port.unwrap_or(DEFAULT_API_PORT);
        let backend_url = env("MEVCHAT_BACKEND_URL")
            .or(file.backend_url)
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let api_url = env("MEVCHAT_API_URL")
            .or(file.api_url)
            .unwrap_or_else(|| format!("http://{}:{}", api_host, api_port));
        let log_level = env("MEVCHAT_LOG_LEVEL")
            .or(file.log_level)
            .and_then(|raw| parse_level(&raw))
            .unwrap_or(Level::INFO);

        Self {
            data_dir,
            api_host,
            api_port,
            backend_url,
            api_url,
            log_level,
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("chats.db")
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
}
