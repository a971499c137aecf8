// Per-sample configuration (samplerun.toml / .samplerun.toml)

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CONFIG_FILE: &str = "samplerun.toml";
pub const HIDDEN_CONFIG_FILE: &str = ".samplerun.toml";

/// Root structure for samplerun.toml
#[derive(Debug, Deserialize, Default, Clone)]
pub struct SampleConfig {
    /// Optional version (must be 1 if present)
    pub version: Option<u32>,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub deploy: DeployConfig,

    #[serde(default)]
    pub probe: ProbeConfig,
}

/// How the container image gets built
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Builder {
    /// `gcloud builds submit`
    #[default]
    CloudBuild,
    /// Local `docker build` followed by `docker push`
    Docker,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct BuildConfig {
    #[serde(default)]
    pub builder: Builder,

    /// Container CLI for the docker builder (docker or podman)
    pub container_cli: Option<String>,

    /// Build arguments for the docker builder, KEY=VALUE
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct DeployConfig {
    /// Region override for this sample
    pub region: Option<String>,

    /// Extra flags appended to `gcloud run deploy`
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables set on the service
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProbeConfig {
    /// Request path checked after deploy
    #[serde(default = "default_probe_path")]
    pub path: String,

    /// Skip the HTTP check entirely
    #[serde(default)]
    pub skip: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            path: default_probe_path(),
            skip: false,
        }
    }
}

fn default_probe_path() -> String {
    "/".to_string()
}

/// Path of the config file for a sample, if it has one
pub fn find_config_file(sample_dir: &Path) -> Option<PathBuf> {
    let config = sample_dir.join(CONFIG_FILE);
    let hidden = sample_dir.join(HIDDEN_CONFIG_FILE);

    if config.exists() && hidden.exists() {
        warn!(
            "Both {} and {} found in {}. Using {}.",
            CONFIG_FILE,
            HIDDEN_CONFIG_FILE,
            sample_dir.display(),
            CONFIG_FILE
        );
    }

    if config.exists() {
        Some(config)
    } else if hidden.exists() {
        Some(hidden)
    } else {
        None
    }
}

/// Load the sample's configuration.
///
/// Returns the defaults if there is no config file.
/// Returns Err if the file exists but cannot be read or parsed, or if the version is unsupported.
/// Unknown fields only produce warnings.
pub fn load_sample_config(sample_dir: &Path) -> Result<SampleConfig> {
    let Some(path) = find_config_file(sample_dir) else {
        debug!("No sample config in {}, using defaults", sample_dir.display());
        return Ok(SampleConfig::default());
    };

    info!("Loading sample config from {}", path.display());
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut unused_fields = Vec::new();
    let deserializer = toml::Deserializer::new(&content);
    let config: SampleConfig = serde_ignored::deserialize(deserializer, |field| {
        unused_fields.push(field.to_string());
    })
    .with_context(|| format!("Failed to parse {}", path.display()))?;

    for field in &unused_fields {
        warn!(
            "Unknown configuration field in {}: {}",
            path.display(),
            field
        );
    }

    if let Some(version) = config.version {
        if version != 1 {
            bail!(
                "Unsupported {} version: {}. This version of samplerun supports version 1.",
                CONFIG_FILE,
                version
            );
        }
    }

    Ok(config)
}
