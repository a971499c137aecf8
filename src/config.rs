use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the Google Cloud project samples deploy to
pub const PROJECT_ENV_VAR: &str = "GOOGLE_CLOUD_PROJECT";

const DEFAULT_REGION: &str = "us-central1";
const DEFAULT_REGISTRY: &str = "gcr.io";
const DEFAULT_CONTAINER_CLI: &str = "docker";
const DEFAULT_PARALLEL: usize = 4;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Source of environment variables.
///
/// Process environment is read through this trait so that tests can hand in a
/// plain map instead of mutating real process state.
pub trait EnvSource: Send + Sync {
    /// Raw lookup of a variable
    fn lookup(&self, key: &str) -> Option<String>;

    /// Read a variable, treating empty strings as if the variable is not set.
    fn var(&self, key: &str) -> Option<String> {
        self.lookup(key).filter(|v| !v.is_empty())
    }
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Global user configuration stored in ~/.config/samplerun/config.json
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    pub region: Option<String>,
    pub registry: Option<String>,
    pub container_cli: Option<String>,
    pub parallel: Option<usize>,
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".config").join("samplerun").join("config.json"))
    }

    /// Load configuration from disk, falling back to defaults if there is none
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(config)
    }

    /// Get the deploy region (env var > config file > default)
    pub fn get_region(&self, env: &dyn EnvSource) -> String {
        env.var("SAMPLERUN_REGION")
            .or_else(|| self.region.clone())
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// Get the container registry host (env var > config file > default)
    pub fn get_registry(&self, env: &dyn EnvSource) -> String {
        env.var("SAMPLERUN_REGISTRY")
            .or_else(|| self.registry.clone())
            .unwrap_or_else(|| DEFAULT_REGISTRY.to_string())
    }

    /// Get the container CLI used by the docker builder (env var > config file > default)
    pub fn get_container_cli(&self, env: &dyn EnvSource) -> String {
        env.var("SAMPLERUN_CONTAINER_CLI")
            .or_else(|| self.container_cli.clone())
            .unwrap_or_else(|| DEFAULT_CONTAINER_CLI.to_string())
    }

    /// Get the number of samples to run at once (env var > config file > default)
    pub fn get_parallel(&self, env: &dyn EnvSource) -> usize {
        env.var("SAMPLERUN_PARALLEL")
            .and_then(|v| v.parse().ok())
            .or(self.parallel)
            .unwrap_or(DEFAULT_PARALLEL)
            .max(1)
    }
}

/// Resolved settings for a harness run
#[derive(Debug, Clone)]
pub struct Settings {
    pub region: String,
    pub registry: String,
    pub container_cli: String,
    pub parallel: usize,
    pub timeout: Duration,
    pub keep_resources: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            registry: DEFAULT_REGISTRY.to_string(),
            container_cli: DEFAULT_CONTAINER_CLI.to_string(),
            parallel: DEFAULT_PARALLEL,
            timeout: DEFAULT_TIMEOUT,
            keep_resources: false,
            log_dir: None,
        }
    }
}

/// Flag overrides for settings, highest precedence
#[derive(Debug, Default, Clone)]
pub struct SettingsOverrides {
    pub region: Option<String>,
    pub registry: Option<String>,
    pub parallel: Option<usize>,
    pub timeout: Option<Duration>,
    pub keep_resources: bool,
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    /// Resolve settings.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Global config file
    /// 4. Defaults
    pub fn resolve(config: &Config, env: &dyn EnvSource, overrides: SettingsOverrides) -> Self {
        Self {
            region: overrides
                .region
                .unwrap_or_else(|| config.get_region(env)),
            registry: overrides
                .registry
                .unwrap_or_else(|| config.get_registry(env)),
            container_cli: config.get_container_cli(env),
            parallel: overrides
                .parallel
                .map(|p| p.max(1))
                .unwrap_or_else(|| config.get_parallel(env)),
            timeout: overrides.timeout.unwrap_or(DEFAULT_TIMEOUT),
            keep_resources: overrides.keep_resources,
            log_dir: overrides.log_dir,
        }
    }
}

/// Parse duration string (e.g., "5m", "30s", "1h", "500ms")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Duration string is empty");
    }

    let (num_str, unit) = if let Some(num_str) = s.strip_suffix("ms") {
        (num_str, "ms")
    } else {
        let split = s.len() - s.chars().last().map_or(0, char::len_utf8);
        (&s[..split], &s[split..])
    };

    let num: u64 = num_str.parse().context("Invalid duration number")?;

    let secs_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(num)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => anyhow::bail!("Invalid duration unit '{}'. Use ms, s, m, or h", unit),
    };

    let secs = num
        .checked_mul(secs_per_unit)
        .with_context(|| format!("Duration '{}' is too large", s))?;

    Ok(Duration::from_secs(secs))
}
