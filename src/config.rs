use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE: &str = ".sunfyre.toml";

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
pub const DEFAULT_GEMINI_API: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .sunfyre.toml.
///
/// Every field is optional. The value is built once in `main` and handed by
/// reference to the gateway, the model client and the store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub user: UserConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token. Overridden by GITHUB_TOKEN when set.
    pub token: Option<String>,
    /// API root, e.g. a GitHub Enterprise host. Defaults to api.github.com.
    pub api_base: Option<String>,
    /// Per-request timeout. Unset means requests may block indefinitely.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmConfig {
    /// Gemini API key. Overridden by GEMINI_API_KEY when set.
    pub api_key: Option<String>,
    /// Model name. Overridden by GEMINI_MODEL when set.
    pub model: Option<String>,
    pub api_base: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot file. Overridden by SUNFYRE_STORE when set.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserConfig {
    /// Identity every stored document is scoped to.
    pub id: Option<String>,
}

impl Config {
    /// Load configuration from .sunfyre.toml in the current directory, then
    /// apply environment overrides. A missing file yields the defaults.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific path without environment overrides.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(path) = lookup("SUNFYRE_STORE") {
            self.store.path = Some(PathBuf::from(path));
        }
    }

    pub fn user_id(&self) -> &str {
        self.user.id.as_deref().unwrap_or("local")
    }

    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(".sunfyre/store.json"))
    }
}

impl GitHubConfig {
    pub fn api_base(&self) -> &str {
        self.api_base.as_deref().unwrap_or(DEFAULT_GITHUB_API)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn api_base(&self) -> &str {
        self.api_base.as_deref().unwrap_or(DEFAULT_GEMINI_API)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
