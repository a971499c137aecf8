use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Table};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod discover;
mod exec;
mod harness;
mod image;
mod lifecycle;
mod probe;
mod report;
mod sample;
mod service;

use config::{Config, EnvSource, ProcessEnv, Settings, SettingsOverrides, PROJECT_ENV_VAR};
use sample::Sample;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build, deploy and verify samples, then delete what was created
    Run {
        /// Sample directories, or directories to search for samples
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,
        /// Region to deploy to (e.g., us-central1)
        #[arg(long)]
        region: Option<String>,
        /// Container registry host (e.g., gcr.io, eu.gcr.io)
        #[arg(long)]
        registry: Option<String>,
        /// Number of samples to run at the same time
        #[arg(long, short)]
        parallel: Option<usize>,
        /// How long to wait for a deployed sample to answer (e.g., '5m', '90s')
        #[arg(long, default_value = "5m")]
        timeout: String,
        /// Keep services and images after the run
        #[arg(long)]
        keep: bool,
        /// Write the output of every command to <LOG_DIR>/<service>.log
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// List the samples found under the given paths
    #[command(visible_alias = "ls")]
    List {
        /// Directories to search for samples
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,
    },
    /// Print the name derived for a sample directory
    Name {
        /// Sample directory
        dir: PathBuf,
        /// Number of characters to leave free for a suffix
        #[arg(long, default_value = "0")]
        suffix_len: usize,
    },
    /// Show the lifecycle steps for a sample without running them
    Plan {
        /// Sample directory
        dir: PathBuf,
        /// Region to deploy to (e.g., us-central1)
        #[arg(long)]
        region: Option<String>,
    },
}

/// Absolute form of a sample path, as used for naming
fn sample_dir_string(dir: &std::path::Path) -> Result<String> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Cannot resolve '{}'", dir.display()))?;
    Ok(dir.to_string_lossy().into_owned())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for all commands
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let env = ProcessEnv;
    let config = Config::load()?;

    match cli.command {
        Commands::Run {
            paths,
            region,
            registry,
            parallel,
            timeout,
            keep,
            log_dir,
        } => {
            let settings = Settings::resolve(
                &config,
                &env,
                SettingsOverrides {
                    region,
                    registry,
                    parallel,
                    timeout: Some(config::parse_duration(&timeout)?),
                    keep_resources: keep,
                    log_dir,
                },
            );

            if env.var(PROJECT_ENV_VAR).is_none() {
                bail!("{} is not set", PROJECT_ENV_VAR);
            }

            let dirs = discover::discover(paths.as_slice())?;
            if dirs.is_empty() {
                bail!("No samples found");
            }
            info!("Found {} sample(s)", dirs.len());

            // Every sample has to be valid before anything gets deployed
            let samples = dirs
                .iter()
                .map(|dir| Sample::new(dir.to_string_lossy(), &env, &settings))
                .collect::<Result<Vec<_>>>()?;

            let harness = harness::Harness::new(settings, Arc::new(exec::SystemRunner));
            let reports = harness.run_all(samples).await;

            report::print_summary(&reports);

            let failed = reports.iter().filter(|r| !r.passed()).count();
            if failed > 0 {
                error!("{} sample(s) failed", failed);
                std::process::exit(1);
            }
        }
        Commands::List { paths } => {
            let dirs = discover::discover(paths.as_slice())?;
            if dirs.is_empty() {
                println!("No samples found");
            }
            for dir in dirs {
                println!("{}", dir.display());
            }
        }
        Commands::Name { dir, suffix_len } => {
            let identity = sample::SampleIdentity::load(sample_dir_string(&dir)?, &env)?;
            println!("{}", identity.sample_name(suffix_len)?);
        }
        Commands::Plan { dir, region } => {
            let settings = Settings::resolve(
                &config,
                &env,
                SettingsOverrides {
                    region,
                    ..Default::default()
                },
            );
            let sample = Sample::new(sample_dir_string(&dir)?, &env, &settings)?;

            println!("Sample:  {}", sample.dir());
            println!("Project: {}", sample.project_id());
            println!("Service: {} ({})", sample.service().name(), sample.service().region());
            println!("Image:   {}", sample.container().url());
            if sample.lifecycle().is_script() {
                println!("Steps from {}", lifecycle::readme::README_FILE);
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("#").add_attribute(Attribute::Bold),
                    Cell::new("PHASE").add_attribute(Attribute::Bold),
                    Cell::new("COMMAND").add_attribute(Attribute::Bold),
                ]);
            for (i, step) in sample.lifecycle().steps().iter().enumerate() {
                table.add_row(vec![
                    Cell::new(i + 1),
                    Cell::new(step.phase),
                    Cell::new(&step.command),
                ]);
            }
            println!("{}", table);

            let probe = sample.lifecycle().probe();
            if probe.skip {
                println!("HTTP check: skipped");
            } else {
                println!("HTTP check: GET {}", probe.path);
            }
        }
    }

    Ok(())
}
