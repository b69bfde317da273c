use std::fmt::Display;
use std::fs::TryLockError;
use std::path::Path;

use tracing::{debug, error, info, trace};

use crate::Simplified;

/// An exclusive advisory lock on a file, released when dropped.
///
/// Used to serialize runs that read and replace the same lock file: the lock is taken on a
/// sibling `<name>.lock` file so the lock file itself can be replaced by an atomic rename.
#[derive(Debug)]
#[must_use]
pub struct LockedFile(fs_err::File);

impl LockedFile {
    fn lock_file_blocking(file: fs_err::File, resource: &str) -> Result<Self, std::io::Error> {
        trace!(
            "Checking lock for `{resource}` at `{}`",
            file.path().user_display()
        );
        match file.file().try_lock() {
            Ok(()) => {
                debug!("Acquired lock for `{resource}`");
                Ok(Self(file))
            }
            Err(err) => {
                if let TryLockError::Error(err) = &err {
                    debug!("Try lock error: {err:?}");
                }
                info!(
                    "Waiting to acquire lock for `{resource}` at `{}`",
                    file.path().user_display(),
                );
                file.file().lock().map_err(|err| {
                    std::io::Error::other(format!(
                        "Could not acquire lock for `{resource}` at `{}`: {err}",
                        file.path().user_display(),
                    ))
                })?;
                debug!("Acquired lock for `{resource}`");
                Ok(Self(file))
            }
        }
    }

    /// Acquire a cross-process lock for a resource, blocking the current thread until the lock is
    /// available.
    ///
    /// Do not use from an async context, as this can block the runtime while waiting for another
    /// process to release the lock.
    pub fn acquire_blocking(
        path: impl AsRef<Path>,
        resource: impl Display,
    ) -> Result<Self, std::io::Error> {
        let file = Self::create(path)?;
        let resource = resource.to_string();
        Self::lock_file_blocking(file, &resource)
    }

    /// Acquire a cross-process lock for a resource using a file at the provided path.
    #[cfg(feature = "tokio")]
    pub async fn acquire(
        path: impl AsRef<Path>,
        resource: impl Display,
    ) -> Result<Self, std::io::Error> {
        let file = Self::create(path)?;
        let resource = resource.to_string();
        tokio::task::spawn_blocking(move || Self::lock_file_blocking(file, &resource)).await?
    }

    /// Acquire the lock only if it is free right now.
    pub fn acquire_no_wait(path: impl AsRef<Path>, resource: impl Display) -> Option<Self> {
        let file = Self::create(path).ok()?;
        match file.file().try_lock() {
            Ok(()) => {
                debug!("Acquired lock for `{resource}`");
                Some(Self(file))
            }
            Err(_) => {
                debug!("Lock is busy for `{resource}`");
                None
            }
        }
    }

    fn create(path: impl AsRef<Path>) -> Result<fs_err::File, std::io::Error> {
        fs_err::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if let Err(err) = self.0.file().unlock() {
            error!(
                "Failed to unlock resource at `{}`; program may be stuck: {err}",
                self.0.path().display()
            );
        } else {
            debug!("Released lock at `{}`", self.0.path().display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LockedFile;

    #[test]
    fn exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.lock.lock");

        let first = LockedFile::acquire_blocking(&path, "tether.lock").unwrap();
        assert!(LockedFile::acquire_no_wait(&path, "tether.lock").is_none());
        drop(first);
        assert!(LockedFile::acquire_no_wait(&path, "tether.lock").is_some());
    }
}
