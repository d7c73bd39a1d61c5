use anyhow::{Context, Result, anyhow};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Where the signed-in session token lives between commands.
pub trait SessionStore {
    fn get_token(&self) -> Option<String>;
    fn set_token(&mut self, token: &str) -> Result<()>;
    fn clear_token(&mut self) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    token: Option<String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn set_token(&mut self, token: &str) -> Result<()> {
        self.token = Some(token.to_string());
        Ok(())
    }

    fn clear_token(&mut self) -> Result<()> {
        self.token = None;
        Ok(())
    }
}

/// Token kept in a single file; a missing or blank file means no session.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| anyhow!("no config directory available"))?;
        Ok(dir.join("api-console").join("token"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn get_token(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let token = raw.trim();
        if token.is_empty() {
            return None;
        }
        Some(token.to_string())
    }

    fn set_token(&mut self, token: &str) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| anyhow!("invalid token path {}", self.path.display()))?;
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

        // Write next to the target, then rename over it.
        let mut file = NamedTempFile::new_in(dir).context("create temp token file")?;
        file.write_all(token.as_bytes())
            .context("write temp token file")?;
        file.persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("write {}", self.path.display()))?;
        log::info!("session token saved to {}", self.path.display());
        Ok(())
    }

    fn clear_token(&mut self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("session token removed from {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove {}", self.path.display())),
        }
    }
}
