use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tether_fs::Simplified;
use tether_normalize::PackageName;
use tether_pep440::Version;
use tether_pypi_types::{FileHash, PackageMetadata};

use crate::{MetadataProvider, ProviderError};

#[derive(Debug, thiserror::Error)]
pub enum StaticIndexError {
    #[error("Failed to read index file: `{}`", path.user_display())]
    Read {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("Failed to parse index file: `{}`", path.user_display())]
    Parse {
        path: PathBuf,
        #[source]
        err: serde_json::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One published version in a [`StaticIndex`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRelease {
    #[serde(flatten)]
    pub metadata: PackageMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileHash>,
}

/// An offline package index, read from a JSON document of the form:
///
/// ```json
/// {
///   "attrs": {
///     "20.3.0": {
///       "python-versions": ">=2.7",
///       "dependencies": {},
///       "files": [{"file": "attrs-20.3.0-py2.py3-none-any.whl", "hash": "sha256:..."}]
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticIndex(BTreeMap<PackageName, BTreeMap<Version, StaticRelease>>);

impl StaticIndex {
    /// Read an index from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StaticIndexError> {
        let path = path.as_ref();
        let contents = fs_err::read_to_string(path).map_err(|err| StaticIndexError::Read {
            path: path.to_path_buf(),
            err,
        })?;
        let index: Self =
            serde_json::from_str(&contents).map_err(|err| StaticIndexError::Parse {
                path: path.to_path_buf(),
                err,
            })?;
        debug!(
            "Loaded {} packages from `{}`",
            index.0.len(),
            path.user_display()
        );
        Ok(index)
    }

    /// Publish a version, replacing any previous release of the same version.
    pub fn insert(&mut self, name: PackageName, version: Version, release: StaticRelease) {
        self.0.entry(name).or_default().insert(version, release);
    }

    /// The published releases of a package, in ascending version order.
    pub fn releases(&self, name: &PackageName) -> Option<&BTreeMap<Version, StaticRelease>> {
        self.0.get(name)
    }

    fn release(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<&StaticRelease, ProviderError> {
        self.0
            .get(name)
            .ok_or_else(|| ProviderError::NotFound(name.clone()))?
            .get(version)
            .ok_or_else(|| ProviderError::VersionNotFound(name.clone(), version.clone()))
    }
}

impl FromStr for StaticIndex {
    type Err = StaticIndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

impl MetadataProvider for StaticIndex {
    fn list_versions<'io>(
        &'io self,
        name: &'io PackageName,
    ) -> impl Future<Output = Result<Vec<Version>, ProviderError>> + 'io {
        async move {
            let releases = self
                .0
                .get(name)
                .ok_or_else(|| ProviderError::NotFound(name.clone()))?;
            Ok(releases.keys().cloned().collect())
        }
    }

    fn get_dependencies<'io>(
        &'io self,
        name: &'io PackageName,
        version: &'io Version,
    ) -> impl Future<Output = Result<PackageMetadata, ProviderError>> + 'io {
        async move { Ok(self.release(name, version)?.metadata.clone()) }
    }

    fn get_file_hashes<'io>(
        &'io self,
        name: &'io PackageName,
        version: &'io Version,
    ) -> impl Future<Output = Result<Vec<FileHash>, ProviderError>> + 'io {
        async move { Ok(self.release(name, version)?.files.clone()) }
    }
}
