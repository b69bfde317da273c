use std::collections::BTreeMap;

use tether_normalize::{ExtraName, PackageName};
use tether_pep440::VersionConstraint;
use tether_pypi_types::Dependency;

use crate::Category;

/// The direct requirements of a project.
///
/// Optional requirements (those activated by a project extra) are always resolved, so a single
/// lock serves every combination of extras.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) dev_dependencies: Vec<Dependency>,
    pub(crate) python_versions: VersionConstraint,
    pub(crate) extras: BTreeMap<ExtraName, Vec<PackageName>>,
}

impl Manifest {
    pub fn new(
        dependencies: Vec<Dependency>,
        dev_dependencies: Vec<Dependency>,
        python_versions: VersionConstraint,
        extras: BTreeMap<ExtraName, Vec<PackageName>>,
    ) -> Self {
        Self {
            dependencies,
            dev_dependencies,
            python_versions,
            extras,
        }
    }

    /// A manifest with only main dependencies, for any Python version.
    pub fn simple(dependencies: Vec<Dependency>) -> Self {
        Self::new(
            dependencies,
            Vec::new(),
            VersionConstraint::any(),
            BTreeMap::new(),
        )
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn dev_dependencies(&self) -> &[Dependency] {
        &self.dev_dependencies
    }

    /// The interpreter versions the project supports.
    pub fn python_versions(&self) -> &VersionConstraint {
        &self.python_versions
    }

    pub fn extras(&self) -> &BTreeMap<ExtraName, Vec<PackageName>> {
        &self.extras
    }

    /// Main requirements followed by development requirements, in declaration order.
    pub(crate) fn root_requirements(&self) -> impl Iterator<Item = (Category, &Dependency)> {
        self.dependencies
            .iter()
            .map(|dependency| (Category::Main, dependency))
            .chain(
                self.dev_dependencies
                    .iter()
                    .map(|dependency| (Category::Dev, dependency)),
            )
    }

    /// Every extra the project declares.
    pub(crate) fn extra_names(&self) -> Vec<ExtraName> {
        self.extras.keys().cloned().collect()
    }
}
