use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};

use tether_fs::Simplified;
use tether_lock::{VerifyError, verify_artifacts, verify_lock};
use tether_resolver::StaticIndex;

use crate::commands::ExitStatus;
use crate::printer::{Printer, plural};
use crate::project::Project;

/// Verify the locked file hashes against the index and, optionally, against files on disk.
pub(crate) async fn verify(
    project: &Project,
    index: &Path,
    artifacts: Option<&Path>,
    printer: Printer,
) -> Result<ExitStatus> {
    let path = project.lock_path();
    let Some(lock) = tether_lock::read(&path).await? else {
        printer.missing_lock(&path)?;
        return Ok(ExitStatus::Failure);
    };

    let provider = StaticIndex::from_path(index)?;
    match verify_lock(&lock, &provider).await {
        Ok(()) => {}
        Err(VerifyError::Mismatch(err)) => {
            printer.failure(err)?;
            return Ok(ExitStatus::Failure);
        }
        Err(err) => return Err(err.into()),
    }

    let files: usize = lock
        .packages()
        .iter()
        .map(|package| package.files.len())
        .sum();
    writeln!(
        printer.status(),
        "Verified {} against `{}`",
        plural(files, "locked file"),
        index.user_display()
    )?;

    if let Some(artifacts) = artifacts {
        let checked = match verify_artifacts(&lock, artifacts) {
            Ok(checked) => checked,
            Err(VerifyError::Mismatch(err)) => {
                printer.failure(err)?;
                return Ok(ExitStatus::Failure);
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to verify artifacts in `{}`", artifacts.user_display())
                });
            }
        };
        writeln!(
            printer.status(),
            "Verified {} in `{}`",
            plural(checked, "artifact"),
            artifacts.user_display()
        )?;
    }

    Ok(ExitStatus::Success)
}
