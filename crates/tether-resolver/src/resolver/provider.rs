use std::future::Future;
use std::sync::Arc;

use tether_normalize::PackageName;
use tether_pep440::Version;
use tether_pypi_types::{FileHash, PackageMetadata};

/// A source of package metadata, such as a registry client or an offline index.
///
/// Implementations are not expected to cache; the resolver memoizes every answer in its
/// [`InMemoryIndex`](crate::InMemoryIndex) and never retries a failed request.
pub trait MetadataProvider {
    /// List the published versions of a package, in any order.
    fn list_versions<'io>(
        &'io self,
        name: &'io PackageName,
    ) -> impl Future<Output = Result<Vec<Version>, ProviderError>> + 'io;

    /// Fetch the dependencies and other metadata of one version of a package.
    fn get_dependencies<'io>(
        &'io self,
        name: &'io PackageName,
        version: &'io Version,
    ) -> impl Future<Output = Result<PackageMetadata, ProviderError>> + 'io;

    /// Fetch the published digests of the distribution files of one version of a package.
    fn get_file_hashes<'io>(
        &'io self,
        name: &'io PackageName,
        version: &'io Version,
    ) -> impl Future<Output = Result<Vec<FileHash>, ProviderError>> + 'io;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Package `{0}` was not found in the package index")]
    NotFound(PackageName),

    #[error("Version {1} of `{0}` was not found in the package index")]
    VersionNotFound(PackageName, Version),

    #[error("Failed to reach the package index")]
    Transport(#[source] Arc<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Wrap a transport-level failure.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}
