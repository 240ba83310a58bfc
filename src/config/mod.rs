//! YAML configuration with environment overrides.
//!
//! Every section is optional; a missing file means all defaults.  After
//! the file is parsed, `OPENAI_MODEL`, `OPENAI_BASE_URL` and
//! `JOURNAL_ADDR` override their counterparts.  The API key is never
//! read from the file, only from `OPENAI_API_KEY`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::analysis::{EmotionMode, NormalizeOptions, SummaryMode};
use crate::models::assistants::DEFAULT_BASE_URL;
use crate::prompt::PromptDialect;
use crate::run::PollPolicy;

/// Top-level configuration loaded from `config.yaml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address, e.g. `0.0.0.0:5001`.
    #[serde(default = "default_addr")]
    pub addr: String,
}

fn default_addr() -> String {
    "0.0.0.0:5001".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

/// Hosted model service settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Model name (e.g. "gpt-4o-mini").  Required, from here or
    /// `OPENAI_MODEL`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout for REST calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: None,
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Run status polling bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PollConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

fn default_interval_ms() -> u64 {
    500
}

fn default_max_interval_ms() -> u64 {
    2000
}

/// Upper bound accepted for `poll.max_wait_secs` (one day).
pub const MAX_WAIT_SECS_LIMIT: u64 = 86_400;

fn default_max_wait_secs() -> u64 {
    60
}

fn default_max_polls() -> u32 {
    240
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            max_wait_secs: default_max_wait_secs(),
            max_polls: default_max_polls(),
        }
    }
}

impl PollConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            max_wait: Duration::from_secs(self.max_wait_secs),
            max_polls: self.max_polls,
        }
    }
}

/// Prompt selection and output shaping.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Built-in instruction template to provision assistants with.
    #[serde(default)]
    pub dialect: PromptDialect,
    #[serde(default = "default_emotion_mode")]
    pub emotion_mode: EmotionMode,
    #[serde(default = "default_summary_mode")]
    pub summary_mode: SummaryMode,
    /// Replaces the built-in template with this file's contents.
    #[serde(default)]
    pub instructions_file: Option<PathBuf>,
}

// The HTTP clients consume flat strings.
fn default_emotion_mode() -> EmotionMode {
    EmotionMode::Flattened
}

fn default_summary_mode() -> SummaryMode {
    SummaryMode::Joined
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            dialect: PromptDialect::default(),
            emotion_mode: default_emotion_mode(),
            summary_mode: default_summary_mode(),
            instructions_file: None,
        }
    }
}

impl AnalysisConfig {
    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            emotion: self.emotion_mode,
            summary: self.summary_mode,
        }
    }

    /// Instructions new assistants are created with.
    pub async fn instructions(&self) -> anyhow::Result<String> {
        match &self.instructions_file {
            Some(path) => {
                let text = tokio::fs::read_to_string(path).await.with_context(|| {
                    format!("failed to read instructions file: {}", path.display())
                })?;
                if text.trim().is_empty() {
                    anyhow::bail!("instructions file is empty: {}", path.display());
                }
                Ok(text)
            }
            None => Ok(self.dialect.instructions().to_string()),
        }
    }
}

/// Optional size-rotated log file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Log file path.  `None` disables file logging.
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// Rotated files kept as `<file>.1 .. <file>.N`.
    #[serde(default = "default_backups")]
    pub backups: usize,
}

fn default_max_bytes() -> u64 {
    10_000
}

fn default_backups() -> usize {
    1
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            max_bytes: default_max_bytes(),
            backups: default_backups(),
        }
    }
}

/// Values that must come from the environment (or config) before the
/// service can talk to the model.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub model: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

impl Config {
    /// Default config location: `<journal_home>/config.yaml`.
    pub fn default_path() -> PathBuf {
        crate::journal_home().join("config.yaml")
    }

    /// Read, parse, apply process-environment overrides and validate.
    ///
    /// A missing file yields the defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Config> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(contents) => Self::parse(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Config::default()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;

        tracing::debug!(
            path = %path.display(),
            addr = %config.server.addr,
            model = config.model.name.as_deref().unwrap_or("<unset>"),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parse YAML without env overrides or validation.
    pub fn parse(contents: &str) -> anyhow::Result<Config> {
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(contents).context("failed to parse config YAML")
    }

    /// Apply `OPENAI_MODEL`, `OPENAI_BASE_URL` and `JOURNAL_ADDR`
    /// through `env`.  Blank values are ignored.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        if let Some(model) = var("OPENAI_MODEL") {
            self.model.name = Some(model);
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(addr) = var("JOURNAL_ADDR") {
            self.server.addr = addr;
        }
    }

    /// Validate semantic constraints that serde cannot enforce.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server
            .addr
            .parse::<SocketAddr>()
            .with_context(|| format!("config: invalid server.addr '{}'", self.server.addr))?;

        if self.model.base_url.trim().is_empty() {
            anyhow::bail!("config: model.base_url is empty");
        }
        if self.model.request_timeout_secs == 0 {
            anyhow::bail!("config: model.request_timeout_secs must be > 0");
        }

        let poll = &self.poll;
        if poll.interval_ms == 0 {
            anyhow::bail!("config: poll.interval_ms must be > 0");
        }
        if poll.max_interval_ms < poll.interval_ms {
            anyhow::bail!(
                "config: poll.max_interval_ms ({}) is below poll.interval_ms ({})",
                poll.max_interval_ms,
                poll.interval_ms
            );
        }
        if poll.max_wait_secs == 0 {
            anyhow::bail!("config: poll.max_wait_secs must be > 0");
        }
        if poll.max_wait_secs > MAX_WAIT_SECS_LIMIT {
            anyhow::bail!(
                "config: poll.max_wait_secs ({}) exceeds {MAX_WAIT_SECS_LIMIT}",
                poll.max_wait_secs
            );
        }
        if poll.max_polls == 0 {
            anyhow::bail!("config: poll.max_polls must be > 0");
        }

        if self.log.max_bytes == 0 {
            anyhow::bail!("config: log.max_bytes must be > 0");
        }

        Ok(())
    }

    /// Resolve the API key (from `env` only) and model name, failing when
    /// either is absent.
    pub fn credentials(&self, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Credentials> {
        let api_key = env("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .context("OPENAI_API_KEY is not set")?;
        let model = self
            .model
            .name
            .clone()
            .filter(|m| !m.trim().is_empty())
            .context("model name is not set (OPENAI_MODEL or model.name)")?;
        Ok(Credentials { api_key, model })
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .addr
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.server.addr))
    }
}
