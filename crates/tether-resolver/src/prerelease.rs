use rustc_hash::FxHashSet;

use tether_normalize::PackageName;
use tether_pep440::Operator;

use crate::Manifest;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum PrereleaseMode {
    /// Disallow all pre-release versions.
    Disallow,

    /// Allow all pre-release versions.
    Allow,

    /// Allow pre-release versions if all versions of a package are pre-release.
    IfNecessary,

    /// Allow pre-release versions for direct dependencies with explicit pre-release markers in
    /// their version requirements.
    Explicit,

    /// Allow pre-release versions if all versions of a package are pre-release, or if the package
    /// has an explicit pre-release marker in its version requirements.
    #[default]
    IfNecessaryOrExplicit,
}

impl std::fmt::Display for PrereleaseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disallow => write!(f, "disallow"),
            Self::Allow => write!(f, "allow"),
            Self::IfNecessary => write!(f, "if-necessary"),
            Self::Explicit => write!(f, "explicit"),
            Self::IfNecessaryOrExplicit => write!(f, "if-necessary-or-explicit"),
        }
    }
}

/// Like [`PrereleaseMode`], but with the set of direct dependencies that name a pre-release.
#[derive(Debug, Clone)]
pub(crate) enum PrereleaseStrategy {
    Disallow,
    Allow,
    IfNecessary,
    Explicit(FxHashSet<PackageName>),
    IfNecessaryOrExplicit(FxHashSet<PackageName>),
}

impl PrereleaseStrategy {
    pub(crate) fn from_mode(mode: PrereleaseMode, manifest: &Manifest) -> Self {
        let explicit = || {
            manifest
                .root_requirements()
                .filter(|(_, dependency)| {
                    dependency
                        .version
                        .alternatives()
                        .iter()
                        .flat_map(|specifiers| specifiers.iter())
                        .filter(|specifier| {
                            !matches!(
                                specifier.operator(),
                                Operator::NotEqual | Operator::NotEqualStar
                            )
                        })
                        .any(tether_pep440::VersionSpecifier::any_prerelease)
                })
                .map(|(_, dependency)| dependency.name.clone())
                .collect()
        };

        match mode {
            PrereleaseMode::Disallow => Self::Disallow,
            PrereleaseMode::Allow => Self::Allow,
            PrereleaseMode::IfNecessary => Self::IfNecessary,
            PrereleaseMode::Explicit => Self::Explicit(explicit()),
            PrereleaseMode::IfNecessaryOrExplicit => Self::IfNecessaryOrExplicit(explicit()),
        }
    }

    /// Returns whether a [`PackageName`] is allowed to have pre-release versions.
    pub(crate) fn allows(&self, package_name: &PackageName) -> AllowPrerelease {
        match self {
            Self::Disallow => AllowPrerelease::No,
            Self::Allow => AllowPrerelease::Yes,
            Self::IfNecessary => AllowPrerelease::IfNecessary,
            Self::Explicit(packages) => {
                if packages.contains(package_name) {
                    AllowPrerelease::Yes
                } else {
                    AllowPrerelease::No
                }
            }
            Self::IfNecessaryOrExplicit(packages) => {
                if packages.contains(package_name) {
                    AllowPrerelease::Yes
                } else {
                    AllowPrerelease::IfNecessary
                }
            }
        }
    }
}

/// The pre-release strategy for a given package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AllowPrerelease {
    /// Allow all pre-release versions.
    Yes,

    /// Disallow all pre-release versions.
    No,

    /// Allow pre-release versions if all versions of this package are pre-release.
    IfNecessary,
}
