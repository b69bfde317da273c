use std::fmt::Write;

use anyhow::Result;

use tether_lock::TreeDisplay;
use tether_warnings::warn_user;

use crate::commands::ExitStatus;
use crate::printer::Printer;
use crate::project::Project;

/// Display the locked dependency tree, starting from the project requirements.
pub(crate) async fn tree(project: &Project, depth: u8, printer: Printer) -> Result<ExitStatus> {
    let path = project.lock_path();
    let Some(lock) = tether_lock::read(&path).await? else {
        printer.missing_lock(&path)?;
        return Ok(ExitStatus::Failure);
    };

    let manifest = project.to_manifest();
    if let Err(err) = lock.check_fresh(&manifest) {
        warn_user!("{err}");
    }

    let roots = lock.roots(&manifest).collect();
    write!(
        printer.result(),
        "{}",
        TreeDisplay::new(&lock, roots, usize::from(depth))
    )?;

    Ok(ExitStatus::Success)
}
