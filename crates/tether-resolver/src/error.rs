use std::fmt::{Display, Formatter};

use itertools::Itertools;

use tether_normalize::{ExtraName, PackageName};
use tether_pep440::{Version, VersionConstraint};

use crate::resolver::ProviderError;

/// Conflicts beyond this many are summarized in a count.
const MAX_REPORTED_CONFLICTS: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Unsatisfiable(#[from] NoSolution),

    #[error("Failed to fetch {request}")]
    Provider {
        request: String,
        #[source]
        err: ProviderError,
    },

    #[error("The channel closed unexpectedly")]
    ChannelClosed,

    #[error("Attempted to wait on an unregistered task: `{_0}`")]
    UnregisteredTask(String),

    #[error("Failed to start the resolver thread")]
    Spawn(#[source] std::io::Error),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ResolveError {
    fn from(_value: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ResolveError {
    fn from(_value: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::ChannelClosed
    }
}

/// Where a dependency edge was declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Origin {
    /// A direct requirement of the project.
    Root,
    /// A dependency of a selected package version.
    Package(PackageName, Version),
}

impl Origin {
    /// The declaring package, or `None` for the project itself.
    pub fn package(&self) -> Option<&PackageName> {
        match self {
            Self::Root => None,
            Self::Package(name, _) => Some(name),
        }
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Package(name, version) => write!(f, "{name} {version}"),
        }
    }
}

/// One constraint that took part in a conflict, rendered as `origin → name constraint`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cause {
    pub origin: Origin,
    pub name: PackageName,
    pub extras: Vec<ExtraName>,
    pub version: VersionConstraint,
}

impl Display for Cause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} → {}", self.origin, self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.iter().join(","))?;
        }
        write!(f, " {}", self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// The constraints on the package admit no version at all.
    Disjoint,
    /// The version selected earlier is excluded by a constraint added later.
    Excluded(Version),
    /// No published version is inside the admissible range.
    NoVersions,
    /// The version does not support the interpreter versions it is needed for.
    Python {
        version: Version,
        requires: VersionConstraint,
        target: String,
    },
}

/// A set of constraints on one package that could not all hold at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conflict {
    pub package: PackageName,
    pub kind: ConflictKind,
    pub causes: Vec<Cause>,
}

impl Display for Conflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ConflictKind::Disjoint => {
                write!(f, "no version of `{}` satisfies every constraint:", self.package)?;
            }
            ConflictKind::Excluded(version) => write!(
                f,
                "`{}` {version} was selected, but it does not satisfy every constraint:",
                self.package
            )?,
            ConflictKind::NoVersions => {
                write!(f, "no available version of `{}` satisfies:", self.package)?;
            }
            ConflictKind::Python {
                version,
                requires,
                target,
            } => {
                return write!(
                    f,
                    "`{}` {version} requires Python {requires}, which does not cover Python {target}",
                    self.package
                );
            }
        }
        for cause in &self.causes {
            write!(f, "\n    {cause}")?;
        }
        Ok(())
    }
}

/// The explanation attached to an unsatisfiable resolution: every distinct conflict the search
/// ran into, in the order it found them.
#[derive(Debug, Clone, Default)]
pub struct NoSolution {
    conflicts: Vec<Conflict>,
}

impl NoSolution {
    pub(crate) fn new(conflicts: Vec<Conflict>) -> Self {
        Self { conflicts }
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }
}

impl Display for NoSolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "No solution found when resolving dependencies:")?;
        for conflict in self.conflicts.iter().take(MAX_REPORTED_CONFLICTS) {
            write!(f, "\n  - {conflict}")?;
        }
        if self.conflicts.len() > MAX_REPORTED_CONFLICTS {
            write!(
                f,
                "\n  ... and {} more conflicts",
                self.conflicts.len() - MAX_REPORTED_CONFLICTS
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for NoSolution {}
