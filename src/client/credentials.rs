use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

const TOKEN_FILE: &str = "token";

/// The client's session token. Shared by clones; persisted to the data directory when loaded
/// from one.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    token: Arc<RwLock<Option<String>>>,
    path: Option<PathBuf>,
}

impl Credentials {
    pub fn in_memory(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token)),
            path: None,
        }
    }

    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(TOKEN_FILE);
        let token = if path.exists() {
            Some(std::fs::read_to_string(&path)?.trim().to_string()).filter(|t| !t.is_empty())
        } else {
            None
        };
        Ok(Self {
            token: Arc::new(RwLock::new(token)),
            path: Some(path),
        })
    }

    pub fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, token: &str) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, token)?;
        }
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if let Some(path) = &self.path
            && path.exists()
        {
            std::fs::remove_file(path)?;
        }
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }
}
