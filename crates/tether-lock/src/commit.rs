use std::path::{Path, PathBuf};

use tracing::debug;

use tether_fs::{LockedFile, Simplified};

use crate::{Lock, LockError, LockErrorKind};

/// The advisory lock that serializes writers of a lock file: `<lock>.lock` next to it.
fn guard_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Acquire the advisory lock for the lock file at `path`, waiting for other writers.
pub async fn acquire(path: &Path) -> Result<LockedFile, LockError> {
    LockedFile::acquire(guard_path(path), path.user_display())
        .await
        .map_err(|err| {
            LockErrorKind::Write {
                path: path.to_path_buf(),
                err,
            }
            .into()
        })
}

/// Read the lock file at `path`, if it exists.
pub async fn read(path: &Path) -> Result<Option<Lock>, LockError> {
    let contents = match fs_err::tokio::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(LockErrorKind::Read {
                path: path.to_path_buf(),
                err,
            }
            .into());
        }
    };
    let lock = Lock::from_toml(&contents).map_err(|err| LockErrorKind::Parse {
        path: path.to_path_buf(),
        err: Box::new(err),
    })?;
    debug!(
        "Read {} locked packages from `{}`",
        lock.packages().len(),
        path.user_display()
    );
    Ok(Some(lock))
}

/// Write the lock to `path` atomically, unless the file already has the same contents.
///
/// The caller is expected to hold the guard returned by [`acquire`] for the whole
/// read-resolve-write cycle. Returns whether the file changed.
pub async fn commit(path: &Path, lock: &Lock) -> Result<bool, LockError> {
    let contents = lock.to_toml();
    if let Ok(existing) = fs_err::tokio::read_to_string(path).await {
        if existing == contents {
            debug!("Lock file is unchanged: `{}`", path.user_display());
            return Ok(false);
        }
    }
    tether_fs::write_atomic(path, contents)
        .await
        .map_err(|err| LockErrorKind::Write {
            path: path.to_path_buf(),
            err,
        })?;
    debug!("Wrote lock file: `{}`", path.user_display());
    Ok(true)
}
