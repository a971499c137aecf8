// Finding sample directories

use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::lifecycle::readme::has_run_marker;
use crate::sample::config::find_config_file;

/// Directories never searched for samples
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "vendor", "__pycache__"];

/// Whether `dir` looks like a deployable sample
pub fn is_sample_dir(dir: &Path) -> bool {
    dir.join("Dockerfile").is_file() || find_config_file(dir).is_some() || has_run_marker(dir)
}

/// Find all sample directories under the given roots.
///
/// A root that is itself a sample is returned as is; otherwise its subtree is
/// searched, and a sample's own subdirectories are not searched further.
/// Paths are canonicalized, sorted and deduplicated.
pub fn discover<P: AsRef<Path>>(roots: &[P]) -> Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();

    for root in roots {
        let root = root.as_ref();
        if !root.exists() {
            bail!("Path '{}' does not exist", root.display());
        }
        if !root.is_dir() {
            bail!("Path '{}' is not a directory", root.display());
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve '{}'", root.display()))?;
        walk(&root, &mut found)?;
    }

    Ok(found.into_iter().collect())
}

fn walk(dir: &Path, found: &mut BTreeSet<PathBuf>) -> Result<()> {
    if is_sample_dir(dir) {
        debug!("Found sample {}", dir.display());
        found.insert(dir.to_path_buf());
        return Ok(());
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Skipping unreadable directory {}: {}", dir.display(), e);
            return Ok(());
        }
    };

    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let file_type = entry.file_type()?;
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || SKIPPED_DIRS.contains(&&*name) {
            continue;
        }
        walk(&entry.path(), found)?;
    }

    Ok(())
}
