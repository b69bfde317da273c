pub use error::{Cause, Conflict, ConflictKind, NoSolution, Origin, ResolveError};
pub use manifest::Manifest;
pub use options::{Options, OptionsBuilder};
pub use preferences::{Preferences, Upgrade};
pub use prerelease::PrereleaseMode;
pub use python_requirement::PythonRequirement;
pub use resolution::{Category, ResolutionGraph, ResolvedPackage};
pub use resolution_mode::ResolutionMode;
pub use resolver::{
    InMemoryIndex, MetadataProvider, MetadataResult, ProviderError, Resolver, ResolverEnvironment,
    VersionsResult,
};
pub use static_index::{StaticIndex, StaticIndexError, StaticRelease};

mod candidate_selector;
mod error;
mod manifest;
mod options;
mod preferences;
mod prerelease;
mod python_requirement;
mod resolution;
mod resolution_mode;
mod resolver;
mod static_index;
