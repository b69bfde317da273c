use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use tether_normalize::PackageName;
use tether_pep440::Version;

/// Which locked versions a resolution may move away from.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum Upgrade {
    /// Keep every locked version that still satisfies the requirements.
    #[default]
    None,
    /// Ignore the existing lock.
    All,
    /// Ignore the locked versions of these packages only.
    Packages(FxHashSet<PackageName>),
}

impl Upgrade {
    /// Determine the upgrade policy from the `--upgrade` and `--upgrade-package` flags.
    pub fn from_args(upgrade: bool, upgrade_package: Vec<PackageName>) -> Self {
        if upgrade {
            Self::All
        } else if upgrade_package.is_empty() {
            Self::None
        } else {
            Self::Packages(upgrade_package.into_iter().collect())
        }
    }

    /// Returns `true` if the locked version of the package should be ignored.
    pub fn contains(&self, name: &PackageName) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Packages(packages) => packages.contains(name),
        }
    }
}

/// Versions to try first, typically taken from an existing lock.
///
/// A preference is only a hint: if the preferred version is out of range it is skipped like any
/// other version.
#[derive(Debug, Default, Clone)]
pub struct Preferences(FxHashMap<PackageName, Version>);

impl Preferences {
    /// Drop the preferences released by the upgrade policy.
    #[must_use]
    pub fn with_upgrade(mut self, upgrade: &Upgrade) -> Self {
        match upgrade {
            Upgrade::None => {}
            Upgrade::All => self.0.clear(),
            Upgrade::Packages(packages) => {
                self.0.retain(|name, version| {
                    if packages.contains(name) {
                        trace!("Ignoring locked version {version} of `{name}`");
                        false
                    } else {
                        true
                    }
                });
            }
        }
        self
    }

    /// Return the preferred version of a package, if any.
    pub fn get(&self, name: &PackageName) -> Option<&Version> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(PackageName, Version)> for Preferences {
    fn from_iter<T: IntoIterator<Item = (PackageName, Version)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use tether_normalize::PackageName;
    use tether_pep440::Version;

    use super::{Preferences, Upgrade};

    fn preferences() -> Preferences {
        [("attrs", "20.3.0"), ("markdown-it-py", "0.6.1")]
            .into_iter()
            .map(|(name, version)| {
                (
                    PackageName::from_str(name).unwrap(),
                    Version::from_str(version).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn upgrade_packages() {
        let attrs = PackageName::from_str("attrs").unwrap();
        let upgrade = Upgrade::from_args(false, vec![attrs.clone()]);
        assert!(upgrade.contains(&attrs));

        let preferences = preferences().with_upgrade(&upgrade);
        assert_eq!(preferences.len(), 1);
        assert!(preferences.get(&attrs).is_none());
        assert_eq!(
            preferences.get(&PackageName::from_str("markdown_it_py").unwrap()),
            Some(&Version::new([0, 6, 1]))
        );
    }

    #[test]
    fn upgrade_all() {
        assert_eq!(Upgrade::from_args(false, Vec::new()), Upgrade::None);
        let upgrade = Upgrade::from_args(true, Vec::new());
        assert!(preferences().with_upgrade(&upgrade).is_empty());
        assert_eq!(preferences().with_upgrade(&Upgrade::None).len(), 2);
    }
}
