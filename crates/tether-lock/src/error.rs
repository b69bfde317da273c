use std::path::PathBuf;

use tether_fs::Simplified;
use tether_normalize::{ExtraName, PackageName};
use tether_pep440::{Version, VersionParseError};

/// An error that occurs when reading, validating, or writing a lock.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct LockError(Box<LockErrorKind>);

impl LockError {
    pub fn kind(&self) -> &LockErrorKind {
        &self.0
    }
}

impl<E> From<E> for LockError
where
    LockErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        LockError(Box::new(LockErrorKind::from(err)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockErrorKind {
    /// The text is not valid TOML, or doesn't have the shape of a lock.
    #[error("The lock file is malformed")]
    Toml(#[from] toml::de::Error),

    /// Two entries for the same package.
    #[error("Found duplicate package `{name}`")]
    DuplicatePackage { name: PackageName },

    /// A required, unconditional dependency of a locked package is not locked itself.
    #[error("For package `{name}`, found dependency `{dependency}` with no locked package")]
    UnrecognizedDependency {
        name: PackageName,
        dependency: PackageName,
    },

    /// An extra of a locked package names a package that isn't one of its dependencies.
    #[error(
        "For package `{name}`, extra `{extra}` refers to `{dependency}`, which is not a dependency"
    )]
    UnknownExtraDependency {
        name: PackageName,
        extra: ExtraName,
        dependency: PackageName,
    },

    /// `[metadata.files]` has an entry for a package that isn't locked.
    #[error("Found file hashes for `{name}`, which is not a locked package")]
    UnrecognizedFiles { name: PackageName },

    #[error("Invalid `lock-version`: `{version}`")]
    InvalidLockVersion {
        version: String,
        #[source]
        err: VersionParseError,
    },

    #[error(
        "The lock file was written in format {found}, which is not supported by this version (expected {expected})"
    )]
    UnsupportedLockVersion { found: Version, expected: Version },

    #[error("Failed to read lock file: `{}`", path.user_display())]
    Read {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("Failed to parse lock file: `{}`", path.user_display())]
    Parse {
        path: PathBuf,
        #[source]
        err: Box<LockError>,
    },

    #[error("Failed to write lock file: `{}`", path.user_display())]
    Write {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}
