use std::fmt::Write;
use std::time::Instant;

use anyhow::Result;
use owo_colors::OwoColorize;
use tracing::debug;

use tether_fs::Simplified;
use tether_lock::{Lock, LockError, diff};
use tether_resolver::{
    InMemoryIndex, Manifest, ResolveError, Resolver, StaticIndex, StaticIndexError, Upgrade,
};

use crate::commands::{ExitStatus, elapsed};
use crate::printer::{Printer, plural};
use crate::project::Project;
use crate::settings::LockSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    /// Write the lock file to disk.
    Write,
    /// Perform a resolution, but don't write the lock file to disk.
    DryRun,
    /// Error if the lock file is not up-to-date with the project requirements.
    Locked,
}

/// The outcome of a lock operation.
enum LockResult {
    /// The existing lock was reused as-is.
    Unchanged,
    /// A new lock, and the lock it replaces, if any.
    Changed(Option<Lock>, Lock),
}

#[derive(Debug, thiserror::Error)]
enum LockFailure {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Index(#[from] StaticIndexError),

    #[error(transparent)]
    Fmt(#[from] std::fmt::Error),
}

/// Resolve the project requirements into a lock file.
pub(crate) async fn lock(
    project: &Project,
    settings: LockSettings,
    printer: Printer,
) -> Result<ExitStatus> {
    let manifest = project.to_manifest();
    let path = project.lock_path();

    // Hold the guard across the whole read-resolve-write cycle.
    let _guard = tether_lock::acquire(&path).await?;

    // A malformed lock is never repaired; only a stale one is.
    let existing = tether_lock::read(&path).await?;

    if settings.mode == LockMode::Locked {
        let Some(existing) = existing else {
            writeln!(
                printer.status(),
                "{}",
                format!(
                    "Unable to find lock file at `{}`, but `--locked` was provided. To create a lock file, run `tether lock`.",
                    path.user_display()
                )
                .bold()
            )?;
            return Ok(ExitStatus::Failure);
        };
        return match existing.check_fresh(&manifest) {
            Ok(()) => {
                debug!("Lock file is up to date");
                Ok(ExitStatus::Success)
            }
            Err(err) => {
                writeln!(
                    printer.status(),
                    "{}",
                    format!("{err}, but `--locked` was provided. To update the lock file, run `tether lock`.").bold()
                )?;
                Ok(ExitStatus::Failure)
            }
        };
    }

    let result = match do_lock(&manifest, existing, &settings, printer).await {
        Ok(result) => result,
        Err(LockFailure::Resolve(ResolveError::Unsatisfiable(err))) => {
            printer.failure(err)?;
            return Ok(ExitStatus::Failure);
        }
        Err(err) => return Err(err.into()),
    };

    match (&result, settings.mode) {
        (LockResult::Unchanged, LockMode::DryRun) => {
            writeln!(printer.status(), "{}", "No lock file changes detected".bold())?;
        }
        (LockResult::Unchanged, _) => {}
        (LockResult::Changed(previous, lock), mode) => {
            let changes = diff(previous.as_ref(), lock);
            for change in &changes {
                writeln!(printer.status(), "{change}")?;
            }
            if mode == LockMode::DryRun {
                // The lock can change without any version changing, e.g., a new marker.
                if changes.is_empty() {
                    writeln!(printer.status(), "{}", "Lock file changes detected".bold())?;
                }
            } else {
                tether_lock::commit(&path, lock).await?;
            }
        }
    }

    Ok(ExitStatus::Success)
}

/// Reuse the existing lock if it still matches the requirements, or resolve them again, preferring
/// the locked versions.
async fn do_lock(
    manifest: &Manifest,
    existing: Option<Lock>,
    settings: &LockSettings,
    printer: Printer,
) -> Result<LockResult, LockFailure> {
    if let Some(existing) = existing.as_ref() {
        match existing.check_fresh(manifest) {
            Ok(()) if settings.upgrade == Upgrade::None => {
                debug!("Existing lock satisfies the project requirements");
                return Ok(LockResult::Unchanged);
            }
            Ok(()) => debug!("Ignoring locked versions due to `--upgrade`"),
            Err(err) => debug!("Resolving again: {err}"),
        }
    }

    let preferences = existing
        .as_ref()
        .map(Lock::preferences)
        .unwrap_or_default()
        .with_upgrade(&settings.upgrade);
    let provider = StaticIndex::from_path(&settings.index)?;

    let start = Instant::now();
    let graph = Resolver::new(
        manifest.clone(),
        settings.options.clone(),
        preferences,
        &InMemoryIndex::default(),
        provider,
    )
    .resolve()
    .await?;
    graph.log();

    writeln!(
        printer.status(),
        "{}",
        format!(
            "Resolved {} in {}",
            plural(graph.len(), "package"),
            elapsed(start.elapsed())
        )
        .dimmed()
    )?;

    let lock = Lock::from_resolution(&graph, manifest)?;
    match existing {
        Some(existing) if existing == lock => Ok(LockResult::Unchanged),
        existing => Ok(LockResult::Changed(existing, lock)),
    }
}
