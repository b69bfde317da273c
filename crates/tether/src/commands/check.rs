use std::fmt::Write;

use anyhow::Result;
use owo_colors::OwoColorize;

use crate::commands::ExitStatus;
use crate::printer::Printer;
use crate::project::Project;

/// Check that the lock file was computed from the current project requirements.
pub(crate) async fn check(project: &Project, printer: Printer) -> Result<ExitStatus> {
    let path = project.lock_path();
    let Some(lock) = tether_lock::read(&path).await? else {
        printer.missing_lock(&path)?;
        return Ok(ExitStatus::Failure);
    };

    match lock.check_fresh(&project.to_manifest()) {
        Ok(()) => {
            writeln!(printer.status(), "Lock file is up to date")?;
            Ok(ExitStatus::Success)
        }
        Err(err) => {
            writeln!(printer.status(), "{}", err.to_string().bold())?;
            Ok(ExitStatus::Failure)
        }
    }
}
