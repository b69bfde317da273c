//! Payloads exchanged with metadata providers: per-version package metadata and the digests of
//! published distribution files.

pub use crate::hash::{FileHash, HashAlgorithm, HashDigest, HashParseError, Hasher};
pub use crate::metadata::{
    Dependency, DependencySpec, DetailedDependency, PackageMetadata, dependencies_from_table,
    dependencies_to_table, dependency_table,
};

mod hash;
mod metadata;
