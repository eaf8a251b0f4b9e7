//! Layered configuration for deckforge.
//!
//! Settings come from `.deckforge/deckforge.toml`, then the environment
//! (a `.env` file is loaded by the binary through `dotenvy`), then CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3140
//! database = "deckforge.db"
//! media_dir = "media"
//! dev_cors = false
//!
//! [generation]
//! cost_tokens = 5
//! image_model = "gemini-2.5-flash-image"
//! embedding_model = "text-embedding-004"
//!
//! [sync]
//! base_url = "https://decks.example.com"
//! user_id = "alice"
//!
//! [logging]
//! level = "info"
//! json = false
//! dir = "logs"
//! ```
//!
//! Relative paths resolve against the `.deckforge` directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = ".deckforge";
pub const CONFIG_FILE: &str = "deckforge.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// SQLite database file
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Directory generated images are written to and served from
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    /// Allow any origin (for a local front-end dev server)
    #[serde(default)]
    pub dev_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3140
}

fn default_database() -> PathBuf {
    PathBuf::from("deckforge.db")
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("media")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            media_dir: default_media_dir(),
            dev_cors: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSection {
    /// Gemini API key. Prefer `GEMINI_API_KEY` over writing it to disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    /// Tokens charged per uncached generation
    #[serde(default = "default_cost_tokens")]
    pub cost_tokens: i64,
}

fn default_cost_tokens() -> i64 {
    5
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            image_model: None,
            embedding_model: None,
            cost_tokens: default_cost_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Daily rolling log files are written here when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalSection {
    /// Offline deck directory. Defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// The complete deckforge.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeckforgeToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub local: LocalSection,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl DeckforgeToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse deckforge.toml")
    }

    /// Load `deckforge.toml` from `config_dir`, or defaults when it is absent.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deckforge.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `DECKFORGE_*` and `GEMINI_API_KEY` overrides from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DECKFORGE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("DECKFORGE_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("DECKFORGE_PORT is not a port number: {}", port))?;
        }
        if let Some(path) = lookup("DECKFORGE_DATABASE") {
            self.server.database = PathBuf::from(path);
        }
        if let Some(path) = lookup("DECKFORGE_MEDIA_DIR") {
            self.server.media_dir = PathBuf::from(path);
        }
        if let Some(level) = lookup("DECKFORGE_LOG") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("DECKFORGE_LOG_JSON") {
            self.logging.json = json != "false" && json != "0";
        }
        if let Some(url) = lookup("DECKFORGE_SYNC_URL") {
            self.sync.base_url = Some(url);
        }
        if let Some(user) = lookup("DECKFORGE_USER") {
            self.sync.user_id = Some(user);
        }
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.generation.api_key = Some(key);
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0: the OS will pick a random port".to_string());
        }
        if self.generation.cost_tokens < 0 {
            warnings.push(format!(
                "generation.cost_tokens must not be negative, got {}",
                self.generation.cost_tokens
            ));
        }
        if self
            .generation
            .api_key
            .as_deref()
            .is_none_or(|k| k.trim().is_empty())
        {
            warnings.push(
                "No Gemini API key configured: image generation and semantic search are disabled"
                    .to_string(),
            );
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            warnings.push(format!(
                "Invalid logging.level '{}': expected one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }
        if let Some(url) = &self.sync.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                warnings.push(format!("sync.base_url '{}' is not an http(s) url", url));
            }
        }

        warnings
    }
}

/// Resolved configuration: file, then environment, then CLI flags.
#[derive(Debug, Clone)]
pub struct DeckforgeConfig {
    pub project_dir: PathBuf,
    pub config_dir: PathBuf,
    pub toml: DeckforgeToml,
}

impl DeckforgeConfig {
    /// Load from `project_dir` and apply process environment overrides.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        Self::with_env(project_dir, |key| std::env::var(key).ok())
    }

    pub fn with_env<F>(project_dir: PathBuf, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let config_dir = project_dir.join(CONFIG_DIR);
        let mut toml = DeckforgeToml::load_or_default(&config_dir)?;
        toml.apply_env(lookup)?;
        Ok(Self {
            project_dir,
            config_dir,
            toml,
        })
    }

    pub fn with_cli_args(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.toml.server.host = host;
        }
        if let Some(port) = port {
            self.toml.server.port = port;
        }
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.toml.server.database)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.resolve(&self.toml.server.media_dir)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.toml.logging.dir.as_deref().map(|d| self.resolve(d))
    }

    pub fn local_dir(&self) -> Option<PathBuf> {
        self.toml.local.dir.as_deref().map(|d| self.resolve(d))
    }

    pub fn api_key(&self) -> Option<&str> {
        self.toml
            .generation
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
