// Cloud Run service a sample deploys to

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::Settings;
use crate::exec::{CommandRunner, CommandSpec};
use crate::sample::name::{random_suffix, NameError, RANDOM_SUFFIX_LEN};
use crate::sample::SampleIdentity;

/// Characters reserved after the sample name: a hyphen plus the random suffix
pub const SERVICE_SUFFIX_LEN: usize = RANDOM_SUFFIX_LEN + 1;

const PLATFORM: &str = "managed";

#[derive(Debug, Clone)]
pub struct CloudRunService {
    sample: Arc<SampleIdentity>,
    name: String,
    region: String,
}

impl CloudRunService {
    /// Create the service reference for a sample, with a fresh random name suffix
    pub fn new(sample: Arc<SampleIdentity>, settings: &Settings) -> Result<Self, NameError> {
        let name = format!(
            "{}-{}",
            sample.sample_name(SERVICE_SUFFIX_LEN)?,
            random_suffix(RANDOM_SUFFIX_LEN)
        );
        let region = sample
            .config()
            .deploy
            .region
            .clone()
            .unwrap_or_else(|| settings.region.clone());

        Ok(Self {
            sample,
            name,
            region,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn gcloud_run(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new("gcloud")
            .arg("run")
            .args(args.iter().copied())
            .arg(&self.name)
            .arg(format!("--project={}", self.sample.project_id()))
            .arg(format!("--region={}", self.region))
            .arg(format!("--platform={}", PLATFORM))
    }

    /// `gcloud run deploy` for the given image, including per-sample flags
    pub fn deploy_command(&self, image_url: &str) -> CommandSpec {
        let deploy = &self.sample.config().deploy;
        let mut cmd = self
            .gcloud_run(&["deploy"])
            .arg(format!("--image={}", image_url))
            .arg("--no-allow-unauthenticated")
            .arg("--quiet");

        if !deploy.env.is_empty() {
            let vars: Vec<String> = deploy
                .env
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect();
            // Custom delimiter so values may contain commas
            cmd = cmd.arg(format!("--set-env-vars=^@^{}", vars.join("@")));
        }

        cmd.args(deploy.args.iter().cloned())
    }

    pub fn describe_url_command(&self) -> CommandSpec {
        self.gcloud_run(&["services", "describe"])
            .arg("--format=value(status.url)")
    }

    pub fn delete_command(&self) -> CommandSpec {
        self.gcloud_run(&["services", "delete"]).arg("--quiet")
    }

    /// Look up the URL the deployed service is reachable at
    pub async fn url(&self, runner: &dyn CommandRunner) -> Result<String> {
        let cmd = self.describe_url_command();
        let output = runner.run(&cmd).await?.check(&cmd)?;
        let url = output.stdout.trim();
        if url.is_empty() {
            bail!("Service '{}' has no URL yet", self.name);
        }
        Ok(url.to_string())
    }
}
