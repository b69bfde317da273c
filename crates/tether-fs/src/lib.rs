use std::path::Path;

use tempfile::NamedTempFile;

pub use crate::locked_file::LockedFile;
pub use crate::path::Simplified;

mod locked_file;
mod path;

/// Return a [`NamedTempFile`] in the specified directory.
///
/// Sets the permissions of the temporary file to `0o666`, to match the non-temporary file default.
/// ([`NamedTempFile`] defaults to `0o600`.)
#[cfg(unix)]
pub fn tempfile_in(path: &Path) -> std::io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;
    tempfile::Builder::new()
        .permissions(std::fs::Permissions::from_mode(0o666))
        .tempfile_in(path)
}

/// Return a [`NamedTempFile`] in the specified directory.
#[cfg(not(unix))]
pub fn tempfile_in(path: &Path) -> std::io::Result<NamedTempFile> {
    tempfile::Builder::new().tempfile_in(path)
}

/// The directory a temporary file for `path` is created in, so the final rename stays on one
/// filesystem.
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn persist(temp_file: NamedTempFile, path: &Path) -> std::io::Result<()> {
    temp_file.persist(path).map_err(|err| {
        std::io::Error::other(format!(
            "Failed to persist temporary file to {}: {}",
            path.user_display(),
            err.error
        ))
    })?;
    Ok(())
}

/// Write `data` to `path` atomically using a temporary file and atomic rename.
#[cfg(feature = "tokio")]
pub async fn write_atomic(path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> std::io::Result<()> {
    let path = path.as_ref();
    let temp_file = tempfile_in(parent_dir(path))?;
    fs_err::tokio::write(&temp_file, &data).await?;
    persist(temp_file, path)
}

/// Write `data` to `path` atomically using a temporary file and atomic rename.
pub fn write_atomic_sync(path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> std::io::Result<()> {
    let path = path.as_ref();
    let temp_file = tempfile_in(parent_dir(path))?;
    fs_err::write(&temp_file, &data)?;
    persist(temp_file, path)
}

#[cfg(test)]
mod tests {
    use super::write_atomic_sync;

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.lock");
        write_atomic_sync(&path, "first").unwrap();
        write_atomic_sync(&path, "second").unwrap();
        assert_eq!(fs_err::read_to_string(&path).unwrap(), "second");

        // No temporary files are left behind.
        let entries = fs_err::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn atomic_write_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("tether.lock");
        assert!(write_atomic_sync(path, "contents").is_err());
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn atomic_write_async() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.lock");
        super::write_atomic(&path, "contents").await.unwrap();
        assert_eq!(fs_err::read_to_string(&path).unwrap(), "contents");
    }
}
