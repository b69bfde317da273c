use std::hash::BuildHasherDefault;
use std::sync::Arc;

use rustc_hash::FxHasher;

use tether_normalize::PackageName;
use tether_once_map::OnceMap;
use tether_pep440::Version;
use tether_pypi_types::PackageMetadata;

use crate::ProviderError;

/// The memoized answer to a version listing.
pub type VersionsResult = Result<Arc<Vec<Version>>, ProviderError>;

/// The memoized answer to a metadata request.
pub type MetadataResult = Result<Arc<PackageMetadata>, ProviderError>;

type FxOnceMap<K, V> = OnceMap<K, V, BuildHasherDefault<FxHasher>>;

/// In-memory index of package metadata.
///
/// Failed requests are stored like successful ones, so the search observes a provider error at
/// the point where it needs the answer and a prefetch that is never consumed can't fail the
/// resolution.
#[derive(Default, Clone)]
pub struct InMemoryIndex(Arc<SharedInMemoryIndex>);

#[derive(Default)]
struct SharedInMemoryIndex {
    /// A map from package name to its published versions, sorted in ascending order.
    packages: FxOnceMap<PackageName, VersionsResult>,

    /// A map from package name and version to the metadata of that version.
    distributions: FxOnceMap<(PackageName, Version), MetadataResult>,
}

impl InMemoryIndex {
    /// Returns a reference to the package versions map.
    pub fn packages(&self) -> &FxOnceMap<PackageName, VersionsResult> {
        &self.0.packages
    }

    /// Returns a reference to the distribution metadata map.
    pub fn distributions(&self) -> &FxOnceMap<(PackageName, Version), MetadataResult> {
        &self.0.distributions
    }
}

impl std::fmt::Debug for InMemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIndex")
            .field("packages", &self.0.packages.len())
            .field("distributions", &self.0.distributions.len())
            .finish()
    }
}
