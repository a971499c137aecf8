// Container image location of a sample in the registry

use chrono::Utc;
use std::sync::Arc;

use crate::config::Settings;
use crate::exec::CommandSpec;
use crate::sample::name::{random_suffix, NameError, RANDOM_SUFFIX_LEN};
use crate::sample::SampleIdentity;
use crate::service::SERVICE_SUFFIX_LEN;

#[derive(Debug, Clone)]
pub struct ContainerImage {
    sample: Arc<SampleIdentity>,
    registry: String,
    name: String,
    tag: String,
}

impl ContainerImage {
    /// Create the image reference for a sample.
    ///
    /// The repository name matches the service name without its random part;
    /// the tag is `YYYYMMDD-HHMMSS-<random>` so concurrent runs never collide.
    pub fn new(sample: Arc<SampleIdentity>, settings: &Settings) -> Result<Self, NameError> {
        let name = sample.sample_name(SERVICE_SUFFIX_LEN)?;
        let tag = format!(
            "{}-{}",
            Utc::now().format("%Y%m%d-%H%M%S"),
            random_suffix(RANDOM_SUFFIX_LEN)
        );

        Ok(Self {
            sample,
            registry: settings.registry.trim_end_matches('/').to_string(),
            name,
            tag,
        })
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Fully qualified image reference, `{registry}/{project}/{name}:{tag}`
    pub fn url(&self) -> String {
        format!(
            "{}/{}/{}:{}",
            self.registry,
            self.sample.project_id(),
            self.name,
            self.tag
        )
    }

    pub fn delete_command(&self) -> CommandSpec {
        CommandSpec::new("gcloud")
            .args(["container", "images", "delete"])
            .arg(self.url())
            .arg(format!("--project={}", self.sample.project_id()))
            .arg("--quiet")
            .arg("--force-delete-tags")
    }
}
