//! Configuration file management for syllabus.
//!
//! Provides a TOML-based config file at `~/.config/syllabus/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use syllabus_core::pipeline::{CommandGenerator, Pipeline, PipelineConfig, RetryPolicy};
use syllabus_db::config::DbConfig;

/// Owner used when none is given on the command line, in the environment or
/// in the config file.
pub const DEFAULT_OWNER: &str = "local";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Owner id for plans created from this machine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub database: DatabaseSection,
    #[serde(default)]
    pub generation: GenerationSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

/// How plans are generated: the text-generation command and the pipeline's
/// timing knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    /// Program that reads a prompt on stdin and writes a reply on stdout.
    pub command: String,
    pub args: Vec<String>,
    /// Per-stage timeout.
    pub timeout_secs: u64,
    /// Retries per stage after a failure. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_delay_ms: u64,
}

impl Default for GenerationSection {
    fn default() -> Self {
        let generator = CommandGenerator::default();
        Self {
            command: generator.program().to_string(),
            args: vec!["-p".to_string()],
            timeout_secs: PipelineConfig::DEFAULT_STAGE_TIMEOUT.as_secs(),
            max_retries: 0,
            retry_delay_ms: 1_000,
        }
    }
}

impl GenerationSection {
    pub fn pipeline_config(&self) -> PipelineConfig {
        let retry = if self.max_retries == 0 {
            RetryPolicy::none()
        } else {
            RetryPolicy::with_retries(
                self.max_retries,
                Duration::from_millis(self.retry_delay_ms),
            )
        };
        PipelineConfig {
            stage_timeout: Duration::from_secs(self.timeout_secs.max(1)),
            retry,
        }
    }

    /// The standard three-stage pipeline driven by the configured command.
    pub fn build_pipeline(&self) -> Pipeline {
        let generator = CommandGenerator::new(self.command.clone(), self.args.clone());
        Pipeline::standard(Arc::new(generator), self.pipeline_config())
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the syllabus config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/syllabus` or
/// `~/.config/syllabus`, on macOS too.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("syllabus");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("syllabus")
}

/// Return the path to the syllabus config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix since the URL may carry a password.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct SyllabusConfig {
    pub db_config: DbConfig,
    pub owner_id: String,
    pub generation: GenerationSection,
}

impl SyllabusConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `SYLLABUS_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Owner: `cli_owner` > `SYLLABUS_OWNER` > `owner` > [`DEFAULT_OWNER`]
    /// - Generation: `[generation]` section, or its defaults
    ///
    /// A missing config file is not an error; a malformed one is.
    pub fn resolve(cli_db_url: Option<&str>, cli_owner: Option<&str>) -> Result<Self> {
        let file_config = if config_path().exists() {
            Some(load_config()?)
        } else {
            None
        };

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("SYLLABUS_DATABASE_URL") {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        // Pool sizing still comes from the environment.
        let mut db_config = DbConfig::from_env();
        db_config.database_url = db_url;

        let owner_id = if let Some(owner) = cli_owner {
            owner.to_string()
        } else if let Ok(owner) = std::env::var("SYLLABUS_OWNER") {
            owner
        } else if let Some(owner) = file_config.as_ref().and_then(|c| c.owner.clone()) {
            owner
        } else {
            DEFAULT_OWNER.to_string()
        };
        let owner_id = owner_id.trim().to_string();
        anyhow::ensure!(!owner_id.is_empty(), "owner id must not be empty");

        let generation = file_config.map(|c| c.generation).unwrap_or_default();

        Ok(Self {
            db_config,
            owner_id,
            generation,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
