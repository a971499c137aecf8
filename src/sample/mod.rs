// A code sample and everything needed to deploy it

pub mod config;
pub mod name;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::{EnvSource, Settings, PROJECT_ENV_VAR};
use crate::image::ContainerImage;
use crate::lifecycle::{get_lifecycle, Lifecycle};
use crate::service::CloudRunService;
use self::config::{load_sample_config, SampleConfig};
use self::name::NameError;

/// Identity of a sample: where it lives and which project it deploys to.
///
/// Collaborators keep a shared handle to this rather than to the [`Sample`]
/// owning them.
#[derive(Debug, Clone)]
pub struct SampleIdentity {
    project_id: String,
    dir: String,
    config: SampleConfig,
}

impl SampleIdentity {
    /// Read the project from the environment and the sample config from `dir`
    pub fn load(dir: impl Into<String>, env: &dyn EnvSource) -> Result<Self> {
        let dir = dir.into();
        let config = load_sample_config(Path::new(&dir))?;
        Ok(Self::with_config(
            env.var(PROJECT_ENV_VAR).unwrap_or_default(),
            dir,
            config,
        ))
    }

    pub fn with_config(
        project_id: impl Into<String>,
        dir: impl Into<String>,
        config: SampleConfig,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dir: dir.into(),
            config,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn config(&self) -> &SampleConfig {
        &self.config
    }

    /// Name derived from the sample directory, leaving room for `suffix_len`
    /// more characters within the service name limit.
    pub fn sample_name(&self, suffix_len: usize) -> Result<String, NameError> {
        name::derive_name(&self.dir, suffix_len)
    }
}

/// A sample together with its service, image and lifecycle
#[derive(Debug)]
pub struct Sample {
    identity: Arc<SampleIdentity>,
    service: CloudRunService,
    container: ContainerImage,
    lifecycle: Lifecycle,
}

impl Sample {
    /// Create the sample located in `dir`.
    ///
    /// Fails as a whole if any of the service, image or lifecycle cannot be
    /// created.
    pub fn new(dir: impl Into<String>, env: &dyn EnvSource, settings: &Settings) -> Result<Self> {
        let identity = Arc::new(SampleIdentity::load(dir, env)?);

        let service = CloudRunService::new(identity.clone(), settings)?;
        let container = ContainerImage::new(identity.clone(), settings)?;
        let lifecycle = get_lifecycle(&identity, &service, &container, settings)?;

        debug!(
            "Created sample {} (service {}, image {})",
            identity.dir(),
            service.name(),
            container.url()
        );

        Ok(Self {
            identity,
            service,
            container,
            lifecycle,
        })
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn identity(&self) -> &SampleIdentity {
        &self.identity
    }

    pub fn dir(&self) -> &str {
        self.identity.dir()
    }

    pub fn project_id(&self) -> &str {
        self.identity.project_id()
    }

    pub fn service(&self) -> &CloudRunService {
        &self.service
    }

    pub fn container(&self) -> &ContainerImage {
        &self.container
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleStatus;
    use std::collections::HashMap;

    const DIR: &str = "/home/ci/src/python-docs-samples/run/hello-world-sample";

    fn env(project: Option<&str>) -> HashMap<String, String> {
        project
            .map(|p| HashMap::from([(PROJECT_ENV_VAR.to_string(), p.to_string())]))
            .unwrap_or_default()
    }

    #[test]
    fn test_new_wires_collaborators() {
        let sample = Sample::new(DIR, &env(Some("my-project")), &Settings::default()).unwrap();

        assert_eq!(sample.project_id(), "my-project");
        assert_eq!(sample.dir(), DIR);
        let base = sample
            .identity()
            .sample_name(crate::service::SERVICE_SUFFIX_LEN)
            .unwrap();
        assert!(sample.service().name().starts_with(&base));
        assert!(sample.container().url().starts_with("gcr.io/my-project/"));
        assert_eq!(sample.lifecycle().steps().len(), 2);
        assert_eq!(sample.lifecycle().status(), LifecycleStatus::Pending);
    }

    #[test]
    fn test_missing_project_is_tolerated() {
        let sample = Sample::new(DIR, &env(None), &Settings::default()).unwrap();
        assert_eq!(sample.project_id(), "");

        let sample = Sample::new(DIR, &env(Some("")), &Settings::default()).unwrap();
        assert_eq!(sample.project_id(), "");
    }

    #[test]
    fn test_sample_name_is_pure() {
        let sample = Sample::new(DIR, &env(Some("p")), &Settings::default()).unwrap();
        let identity = sample.identity();
        assert_eq!(
            identity.sample_name(5).unwrap(),
            identity.sample_name(5).unwrap()
        );
        // 33 character window: "cs-samples/run/hello-world-sample"
        assert_eq!(
            identity.sample_name(20).unwrap(),
            "cs-samples-run-hello-world-sample"
        );
    }

    #[test]
    fn test_service_failure_aborts_construction() {
        let err = Sample::new("ab", &env(Some("p")), &Settings::default()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<NameError>(),
            Some(&NameError::DirTooShort {
                dir: "ab".to_string(),
                len: 2,
                window: name::MAX_SERVICE_NAME_LEN - crate::service::SERVICE_SUFFIX_LEN,
            })
        );
    }

    #[test]
    fn test_lifecycle_failure_aborts_construction() {
        let root = tempfile::tempdir().unwrap();
        let dir = root
            .path()
            .join("nodejs-docs-samples")
            .join("run")
            .join("broken-readme-sample");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("README.md"), "[//]: # ({sst-run-unix})\n```\nls\n").unwrap();

        let result = Sample::new(dir.to_str().unwrap(), &env(Some("p")), &Settings::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_sample_config_aborts_construction() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("java-docs-samples").join("run").join("hello-config");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(config::CONFIG_FILE), "version = 7\n").unwrap();

        let err = Sample::new(dir.to_str().unwrap(), &env(Some("p")), &Settings::default())
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported"));
    }
}
