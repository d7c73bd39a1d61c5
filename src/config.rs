use anyhow::Result;
use std::path::PathBuf;

use crate::catalog::EndpointCatalog;
use crate::session::FileSessionStore;

pub const ENV_BASE_URL: &str = "API_CONSOLE_BASE_URL";
pub const ENV_TOKEN: &str = "API_CONSOLE_TOKEN";
pub const ENV_TOKEN_FILE: &str = "API_CONSOLE_TOKEN_FILE";

/// Values given on the command line; each falls back to the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub base_url: String,
    /// Token given explicitly; takes precedence over the saved session.
    pub token: Option<String>,
    /// Explicit token file; `None` means the per-user default.
    pub token_file: Option<PathBuf>,
    pub timeout: Option<u64>,
}

impl Config {
    pub fn resolve(
        overrides: Overrides,
        catalog: &EndpointCatalog,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let base_url = overrides
            .base_url
            .or_else(|| env(ENV_BASE_URL))
            .unwrap_or_else(|| catalog.default_base_url.clone());

        let token = overrides
            .token
            .or_else(|| env(ENV_TOKEN))
            .filter(|token| !token.is_empty());

        let token_file = overrides
            .token_file
            .or_else(|| env(ENV_TOKEN_FILE).map(PathBuf::from));

        Self {
            base_url,
            token,
            token_file,
            timeout: overrides.timeout,
        }
    }

    pub fn from_env(overrides: Overrides, catalog: &EndpointCatalog) -> Self {
        Self::resolve(overrides, catalog, |key| std::env::var(key).ok())
    }

    /// Where the session token lives. The per-user config dir is only
    /// consulted when no path was given.
    pub fn token_path(&self) -> Result<PathBuf> {
        match &self.token_file {
            Some(path) => Ok(path.clone()),
            None => FileSessionStore::default_path(),
        }
    }

    pub fn session_store(&self) -> Result<FileSessionStore> {
        Ok(FileSessionStore::new(self.token_path()?))
    }
}
