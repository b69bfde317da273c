use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use tether_normalize::PackageName;
use tether_pep440::Version;

use crate::Lock;

/// A change to one package between two locks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockChange {
    Added {
        name: PackageName,
        version: Version,
    },
    Removed {
        name: PackageName,
        version: Version,
    },
    Updated {
        name: PackageName,
        from: Version,
        to: Version,
    },
}

impl Display for LockChange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added { name, version } => write!(f, "Added {name} v{version}"),
            Self::Removed { name, version } => write!(f, "Removed {name} v{version}"),
            Self::Updated { name, from, to } => write!(f, "Updated {name} v{from} -> v{to}"),
        }
    }
}

/// The package-level changes from an existing lock, if any, to a new one, ordered by name.
pub fn diff(previous: Option<&Lock>, current: &Lock) -> Vec<LockChange> {
    let before: BTreeMap<&PackageName, &Version> = previous
        .map(|lock| {
            lock.packages()
                .iter()
                .map(|package| (&package.name, &package.version))
                .collect()
        })
        .unwrap_or_default();
    let after: BTreeMap<&PackageName, &Version> = current
        .packages()
        .iter()
        .map(|package| (&package.name, &package.version))
        .collect();

    let mut changes = Vec::new();
    for (name, version) in &after {
        match before.get(name) {
            None => changes.push(LockChange::Added {
                name: (*name).clone(),
                version: (*version).clone(),
            }),
            Some(from) if from != version => changes.push(LockChange::Updated {
                name: (*name).clone(),
                from: (*from).clone(),
                to: (*version).clone(),
            }),
            Some(_) => {}
        }
    }
    for (name, version) in &before {
        if !after.contains_key(name) {
            changes.push(LockChange::Removed {
                name: (*name).clone(),
                version: (*version).clone(),
            });
        }
    }
    changes.sort_by(|a, b| a.name().cmp(b.name()));
    changes
}

impl LockChange {
    pub fn name(&self) -> &PackageName {
        match self {
            Self::Added { name, .. } | Self::Removed { name, .. } | Self::Updated { name, .. } => {
                name
            }
        }
    }
}
