// Runs samples through their lifecycle: build, deploy, verify, clean up

use anyhow::{Context, Result};
use reqwest::Client;
use std::any::Any;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::Settings;
use crate::exec::{CommandOutput, CommandRunner, CommandSpec};
use crate::lifecycle::LifecycleStatus;
use crate::probe::{self, ProbeOptions, PROBE_INTERVAL};
use crate::sample::Sample;

/// Outcome of running one sample
#[derive(Debug, Clone)]
pub struct SampleReport {
    pub dir: String,
    pub service: String,
    pub image: String,
    pub status: LifecycleStatus,
    pub url: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
}

impl SampleReport {
    /// Failed report for a sample whose run never produced one
    fn unfinished(sample: &Sample) -> Self {
        Self {
            dir: sample.dir().to_string(),
            service: sample.service().name().to_string(),
            image: sample.container().url(),
            status: LifecycleStatus::Failed,
            url: None,
            error: Some("sample task did not finish".to_string()),
            duration: Duration::ZERO,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == LifecycleStatus::Passed
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Clone)]
pub struct Harness {
    settings: Arc<Settings>,
    runner: Arc<dyn CommandRunner>,
    http_client: Client,
    probe_interval: Duration,
}

impl Harness {
    pub fn new(settings: Settings, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            settings: Arc::new(settings),
            runner,
            http_client: Client::new(),
            probe_interval: PROBE_INTERVAL,
        }
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Run all samples, at most `settings.parallel` at a time.
    ///
    /// Reports come back in the order the samples were given, one per sample.
    /// A sample whose task panics is reported as failed.
    pub async fn run_all(&self, samples: Vec<Sample>) -> Vec<SampleReport> {
        let semaphore = Arc::new(Semaphore::new(self.settings.parallel.max(1)));
        let mut tasks = JoinSet::new();
        let mut reports = Vec::with_capacity(samples.len());
        let mut indices = HashMap::new();

        for (index, sample) in samples.into_iter().enumerate() {
            reports.push(SampleReport::unfinished(&sample));

            let harness = self.clone();
            let semaphore = semaphore.clone();
            let handle = tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                harness.run_sample(sample).await
            });
            indices.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, report)) => {
                    if let Some(&index) = indices.get(&id) {
                        reports[index] = report;
                    }
                }
                Err(e) => {
                    let Some(&index) = indices.get(&e.id()) else {
                        error!("Unknown sample task failed: {}", e);
                        continue;
                    };
                    let reason = if e.is_panic() {
                        format!("sample task panicked: {}", panic_message(e.into_panic()))
                    } else {
                        "sample task was cancelled".to_string()
                    };
                    error!("✗ {}: {}", reports[index].dir, reason);
                    reports[index].error = Some(reason);
                }
            }
        }

        reports
    }

    /// Build, deploy and verify a single sample, then clean up after it
    pub async fn run_sample(&self, sample: Sample) -> SampleReport {
        let span = info_span!("sample", service = %sample.service().name());
        self.run_sample_inner(sample).instrument(span).await
    }

    async fn run_sample_inner(&self, mut sample: Sample) -> SampleReport {
        let start = Instant::now();
        info!("Testing sample {}", sample.dir());

        let mut log = match SampleLog::open(
            self.settings.log_dir.as_deref(),
            sample.service().name(),
        ) {
            Ok(log) => log,
            Err(e) => {
                warn!("Not writing a command log: {:#}", e);
                SampleLog::disabled()
            }
        };

        let mut url = None;
        let result = self.deploy_and_verify(&mut sample, &mut log, &mut url).await;

        let error = match result {
            Ok(()) => {
                info!("✓ Sample passed in {:.1?}", start.elapsed());
                None
            }
            Err(e) => {
                error!("✗ Sample failed: {:#}", e);
                if let Err(e) = sample.lifecycle_mut().transition(LifecycleStatus::Failed) {
                    warn!("{}", e);
                }
                Some(format!("{:#}", e))
            }
        };

        if self.settings.keep_resources {
            info!(
                "Keeping service {} and image {}",
                sample.service().name(),
                sample.container().url()
            );
        } else {
            self.clean_up(&sample, &mut log).await;
        }

        SampleReport {
            dir: sample.dir().to_string(),
            service: sample.service().name().to_string(),
            image: sample.container().url(),
            status: sample.lifecycle().status(),
            url,
            error,
            duration: start.elapsed(),
        }
    }

    async fn deploy_and_verify(
        &self,
        sample: &mut Sample,
        log: &mut SampleLog,
        url: &mut Option<String>,
    ) -> Result<()> {
        let steps = sample.lifecycle().steps().to_vec();
        for step in &steps {
            sample.lifecycle_mut().transition(step.phase.status())?;
            info!("Running {} step: {}", step.phase, step.command);
            self.run_logged(&step.command, log).await?;
        }

        let probe_config = sample.lifecycle().probe().clone();
        if probe_config.skip {
            info!("HTTP check disabled for this sample");
            sample.lifecycle_mut().transition(LifecycleStatus::Passed)?;
            return Ok(());
        }

        sample.lifecycle_mut().transition(LifecycleStatus::Verifying)?;
        let service_url = sample.service().url(self.runner.as_ref()).await?;
        info!("Service is deployed at {}", service_url);
        *url = Some(service_url.clone());

        let token = probe::identity_token(self.runner.as_ref()).await?;
        let target = probe::probe_url(&service_url, &probe_config.path);
        probe::wait_until_ready(
            &self.http_client,
            ProbeOptions {
                url: &target,
                token: Some(&token),
                timeout: self.settings.timeout,
                interval: self.probe_interval,
            },
        )
        .await?;

        sample.lifecycle_mut().transition(LifecycleStatus::Passed)?;
        Ok(())
    }

    async fn run_logged(&self, cmd: &CommandSpec, log: &mut SampleLog) -> Result<CommandOutput> {
        let output = self.runner.run(cmd).await?;
        log.record(cmd, &output);
        output.check(cmd)
    }

    /// Delete the service and the image; failures are logged, not returned
    async fn clean_up(&self, sample: &Sample, log: &mut SampleLog) {
        for cmd in [
            sample.service().delete_command(),
            sample.container().delete_command(),
        ] {
            info!("Cleaning up: {}", cmd);
            if let Err(e) = self.run_logged(&cmd, log).await {
                warn!("Cleanup failed: {:#}", e);
            }
        }
    }
}

/// Per-sample file with the output of every command run for it
struct SampleLog {
    file: Option<File>,
}

impl SampleLog {
    fn open(log_dir: Option<&Path>, service: &str) -> Result<Self> {
        let Some(log_dir) = log_dir else {
            return Ok(Self::disabled());
        };
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
        let path = log_dir.join(format!("{}.log", service));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Self { file: Some(file) })
    }

    fn disabled() -> Self {
        Self { file: None }
    }

    fn record(&mut self, cmd: &CommandSpec, output: &CommandOutput) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let code = output
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let result = writeln!(
            file,
            "$ {}\n{}{}[exit {}]\n",
            cmd, output.stdout, output.stderr, code
        );
        if let Err(e) = result {
            warn!("Failed to write command log: {}", e);
            self.file = None;
        }
    }
}
