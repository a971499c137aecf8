// Build-and-deploy lifecycle of a sample
//
// A lifecycle is the ordered list of commands that turn a sample directory
// into a running service, plus the status the sample has reached so far.

mod build;
pub mod readme;
pub mod state;

pub use state::{InvalidTransition, LifecycleStatus};

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::config::{Settings, PROJECT_ENV_VAR};
use crate::exec::CommandSpec;
use crate::image::ContainerImage;
use crate::sample::config::{Builder, ProbeConfig};
use crate::sample::SampleIdentity;
use crate::service::CloudRunService;

/// What a lifecycle step does, used to drive status transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Build,
    Push,
    Deploy,
    /// Command taken from the sample's README, builds and deploys on its own
    Script,
}

impl StepPhase {
    /// Status a sample is in while a step of this phase runs
    pub fn status(self) -> LifecycleStatus {
        match self {
            StepPhase::Build | StepPhase::Push => LifecycleStatus::Building,
            StepPhase::Deploy | StepPhase::Script => LifecycleStatus::Deploying,
        }
    }
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepPhase::Build => "build",
            StepPhase::Push => "push",
            StepPhase::Deploy => "deploy",
            StepPhase::Script => "script",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleStep {
    pub phase: StepPhase,
    pub command: CommandSpec,
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    steps: Vec<LifecycleStep>,
    status: LifecycleStatus,
    probe: ProbeConfig,
}

impl Lifecycle {
    pub fn new(steps: Vec<LifecycleStep>, probe: ProbeConfig) -> Self {
        Self {
            steps,
            status: LifecycleStatus::Pending,
            probe,
        }
    }

    pub fn steps(&self) -> &[LifecycleStep] {
        &self.steps
    }

    pub fn status(&self) -> LifecycleStatus {
        self.status
    }

    pub fn probe(&self) -> &ProbeConfig {
        &self.probe
    }

    /// Whether the steps come from the sample's README
    pub fn is_script(&self) -> bool {
        self.steps.iter().any(|s| s.phase == StepPhase::Script)
    }

    /// Move to a new status; staying in the current status is a no-op
    pub fn transition(&mut self, to: LifecycleStatus) -> Result<(), InvalidTransition> {
        if self.status == to {
            return Ok(());
        }
        state::validate_transition(self.status, to)?;
        debug!("Lifecycle status {} -> {}", self.status, to);
        self.status = to;
        Ok(())
    }
}

/// Assemble the lifecycle for a sample.
///
/// Uses the marked commands from the sample's README when there are any,
/// otherwise builds the image with the configured builder and deploys it.
pub fn get_lifecycle(
    sample: &SampleIdentity,
    service: &CloudRunService,
    image: &ContainerImage,
    settings: &Settings,
) -> Result<Lifecycle> {
    let dir = Path::new(sample.dir());
    let probe = sample.config().probe.clone();

    if let Some(commands) = readme_commands(dir)? {
        info!(
            "Using {} lifecycle command(s) from {}",
            commands.len(),
            dir.join(readme::README_FILE).display()
        );
        let image_url = image.url();
        let steps = commands
            .into_iter()
            .map(|script| LifecycleStep {
                phase: StepPhase::Script,
                command: CommandSpec::shell(script)
                    .current_dir(dir)
                    .env("SAMPLE_IMAGE", image_url.as_str())
                    .env("SAMPLE_SERVICE", service.name())
                    .env("SAMPLE_REGION", service.region())
                    .env(PROJECT_ENV_VAR, sample.project_id()),
            })
            .collect();
        return Ok(Lifecycle::new(steps, probe));
    }

    let build = &sample.config().build;
    let image_url = image.url();
    let mut steps = Vec::new();

    match build.builder {
        Builder::CloudBuild => {
            steps.push(LifecycleStep {
                phase: StepPhase::Build,
                command: build::cloud_build_command(dir, sample.project_id(), &image_url),
            });
        }
        Builder::Docker => {
            let container_cli = build
                .container_cli
                .as_deref()
                .unwrap_or(&settings.container_cli);
            steps.push(LifecycleStep {
                phase: StepPhase::Build,
                command: build::docker_build_command(dir, container_cli, &image_url, &build.args),
            });
            steps.push(LifecycleStep {
                phase: StepPhase::Push,
                command: build::docker_push_command(container_cli, &image_url),
            });
        }
    }

    steps.push(LifecycleStep {
        phase: StepPhase::Deploy,
        command: service.deploy_command(&image_url),
    });

    Ok(Lifecycle::new(steps, probe))
}

fn readme_commands(dir: &Path) -> Result<Option<Vec<String>>> {
    let path = dir.join(readme::README_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    readme::parse_commands(&content).with_context(|| format!("Invalid {}", path.display()))
}
