use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use tether_fs::Simplified;
use tether_pep508::MarkerEnvironment;
use tether_resolver::{Options, OptionsBuilder, ResolverEnvironment, Upgrade};

use crate::cli::{IndexArgs, LockArgs};
use crate::commands::LockMode;
use crate::project::Project;

/// The resolved settings for the `lock` command: command-line flags, then `[tool.tether]`, then
/// the defaults.
#[derive(Debug, Clone)]
pub(crate) struct LockSettings {
    pub(crate) mode: LockMode,
    pub(crate) index: PathBuf,
    pub(crate) options: Options,
    pub(crate) upgrade: Upgrade,
}

impl LockSettings {
    pub(crate) fn resolve(args: LockArgs, project: &Project) -> Result<Self> {
        let LockArgs {
            index_args,
            resolution,
            prerelease,
            target,
            upgrade,
            upgrade_package,
            locked,
            dry_run,
        } = args;
        let tool = project.settings();

        let environment = match target {
            Some(path) => ResolverEnvironment::specific(read_environment(&path)?),
            None => ResolverEnvironment::Universal,
        };
        let options = OptionsBuilder::new()
            .resolution_mode(resolution.or(tool.resolution).unwrap_or_default())
            .prerelease_mode(prerelease.or(tool.prerelease).unwrap_or_default())
            .environment(environment)
            .build();

        let mode = if locked {
            LockMode::Locked
        } else if dry_run {
            LockMode::DryRun
        } else {
            LockMode::Write
        };

        Ok(Self {
            mode,
            index: index_path(index_args, project)?,
            options,
            upgrade: Upgrade::from_args(upgrade, upgrade_package),
        })
    }
}

/// The package index to use: `--index`, or the `index` in `[tool.tether]`.
pub(crate) fn index_path(args: IndexArgs, project: &Project) -> Result<PathBuf> {
    let index = args
        .index
        .or_else(|| {
            project
                .settings()
                .index
                .map(|index| project.root().join(index))
        })
        .ok_or_else(|| {
            anyhow!("No package index configured; pass `--index` or set `index` in `[tool.tether]`")
        })?;
    debug!("Using package index: `{}`", index.user_display());
    Ok(index)
}

/// Read a marker environment from a JSON file.
fn read_environment(path: &Path) -> Result<MarkerEnvironment> {
    let contents = fs_err::read_to_string(path)?;
    let environment = serde_json::from_str(&contents).with_context(|| {
        format!(
            "Failed to parse target environment: `{}`",
            path.user_display()
        )
    })?;
    debug!("Resolving for the environment in `{}`", path.user_display());
    Ok(environment)
}
