use std::io::Read;
use std::path::{Path, PathBuf};

use futures::{StreamExt, TryStreamExt};
use tracing::{debug, trace};

use tether_fs::Simplified;
use tether_normalize::PackageName;
use tether_pep440::Version;
use tether_pypi_types::{FileHash, HashAlgorithm, HashDigest, Hasher};
use tether_resolver::{MetadataProvider, ProviderError};

use crate::{Lock, LockedPackage};

/// A locked file hash that doesn't match the artifact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashMismatch {
    #[error(
        "Hash mismatch for `{file}` of `{name}=={version}`\n\nExpected:\n  {expected}\n\nComputed:\n  {actual}"
    )]
    Digest {
        name: PackageName,
        version: Version,
        file: String,
        expected: HashDigest,
        actual: HashDigest,
    },
    #[error("`{file}` of `{name}=={version}` is locked, but no longer published")]
    MissingFile {
        name: PackageName,
        version: Version,
        file: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Mismatch(#[from] HashMismatch),

    #[error("Failed to fetch the file hashes of `{name}=={version}`")]
    Provider {
        name: PackageName,
        version: Version,
        #[source]
        err: ProviderError,
    },

    #[error("Failed to hash `{}`", path.user_display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// Check the locked files of a package against the hashes a provider reports for them.
///
/// Files the provider reports that aren't locked are ignored; a locked file the provider doesn't
/// report is a mismatch.
pub fn verify_package(package: &LockedPackage, reported: &[FileHash]) -> Result<(), HashMismatch> {
    for locked in &package.files {
        let Some(published) = reported
            .iter()
            .find(|published| published.file == locked.file)
        else {
            return Err(HashMismatch::MissingFile {
                name: package.name.clone(),
                version: package.version.clone(),
                file: locked.file.clone(),
            });
        };
        if published.hash != locked.hash {
            return Err(HashMismatch::Digest {
                name: package.name.clone(),
                version: package.version.clone(),
                file: locked.file.clone(),
                expected: locked.hash.clone(),
                actual: published.hash.clone(),
            });
        }
        trace!("Verified `{}` of `{}`", locked.file, package.name);
    }
    Ok(())
}

/// Check every locked file against the provider, fetching concurrently.
pub async fn verify_lock<Provider: MetadataProvider>(
    lock: &Lock,
    provider: &Provider,
) -> Result<(), VerifyError> {
    futures::stream::iter(lock.packages())
        .map(|package| async move {
            let reported = provider
                .get_file_hashes(&package.name, &package.version)
                .await
                .map_err(|err| VerifyError::Provider {
                    name: package.name.clone(),
                    version: package.version.clone(),
                    err,
                })?;
            verify_package(package, &reported)?;
            Ok::<(), VerifyError>(())
        })
        .buffer_unordered(50)
        .try_collect::<Vec<()>>()
        .await?;
    debug!("Verified {} packages", lock.packages().len());
    Ok(())
}

/// Check the locked files found in `directory` against their locked digests. Files that aren't
/// present are skipped. Returns the number of files checked.
pub fn verify_artifacts(lock: &Lock, directory: &Path) -> Result<usize, VerifyError> {
    let mut checked = 0;
    for package in lock.packages() {
        for locked in &package.files {
            let path = directory.join(&locked.file);
            if !path.is_file() {
                trace!("Skipping missing artifact: `{}`", path.user_display());
                continue;
            }
            let actual = hash_file(&path, locked.hash.algorithm())
                .map_err(|err| VerifyError::Io { path, err })?;
            if actual != locked.hash {
                return Err(HashMismatch::Digest {
                    name: package.name.clone(),
                    version: package.version.clone(),
                    file: locked.file.clone(),
                    expected: locked.hash.clone(),
                    actual,
                }
                .into());
            }
            checked += 1;
        }
    }
    Ok(checked)
}

/// Compute the digest of a file on disk.
pub fn hash_file(path: impl AsRef<Path>, algorithm: HashAlgorithm) -> std::io::Result<HashDigest> {
    let mut file = fs_err::File::open(path.as_ref())?;
    let mut hasher = Hasher::from(algorithm);
    let mut buffer = vec![0; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use tether_normalize::PackageName;
    use tether_pep440::{Version, VersionConstraint};
    use tether_pep508::MarkerTree;
    use tether_pypi_types::{FileHash, HashAlgorithm, HashDigest};
    use tether_resolver::Category;

    use super::{HashMismatch, hash_file, verify_package};
    use crate::LockedPackage;

    fn package(files: Vec<FileHash>) -> LockedPackage {
        LockedPackage {
            name: PackageName::from_str("attrs").unwrap(),
            version: Version::from_str("20.3.0").unwrap(),
            description: String::new(),
            category: Category::Main,
            optional: false,
            python_versions: VersionConstraint::any(),
            markers: MarkerTree::True,
            dependencies: Vec::new(),
            extras: std::collections::BTreeMap::new(),
            files,
        }
    }

    fn file(name: &str, contents: &str) -> FileHash {
        FileHash {
            file: name.to_string(),
            hash: HashDigest::sha256(contents),
        }
    }

    #[test]
    fn matching() {
        let locked = package(vec![file("attrs-20.3.0.tar.gz", "sdist")]);
        let reported = [
            file("attrs-20.3.0.tar.gz", "sdist"),
            file("attrs-20.3.0-py3-none-any.whl", "wheel"),
        ];
        assert_eq!(verify_package(&locked, &reported), Ok(()));
    }

    #[test]
    fn mismatch() {
        let locked = package(vec![file("attrs-20.3.0.tar.gz", "sdist")]);
        let err = verify_package(&locked, &[file("attrs-20.3.0.tar.gz", "tampered")]).unwrap_err();
        assert!(matches!(err, HashMismatch::Digest { .. }));
        assert!(err.to_string().starts_with(
            "Hash mismatch for `attrs-20.3.0.tar.gz` of `attrs==20.3.0`"
        ));

        let err = verify_package(&locked, &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "`attrs-20.3.0.tar.gz` of `attrs==20.3.0` is locked, but no longer published"
        );
    }

    #[test]
    fn file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attrs-20.3.0.tar.gz");
        fs_err::write(&path, "sdist").unwrap();

        assert_eq!(
            hash_file(&path, HashAlgorithm::Sha256).unwrap(),
            HashDigest::sha256("sdist")
        );
        assert_eq!(
            hash_file(&path, HashAlgorithm::Sha512)
                .unwrap()
                .algorithm(),
            HashAlgorithm::Sha512
        );
    }
}
