use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use toml_edit::{Array, ArrayOfTables, InlineTable, Item, Table, Value, value};
use tracing::debug;

use tether_normalize::{ExtraName, PackageName};
use tether_pep440::{Version, VersionConstraint};
use tether_pep508::MarkerTree;
use tether_pypi_types::{
    Dependency, DependencySpec, DetailedDependency, FileHash, dependencies_to_table,
    dependency_table,
};
use tether_resolver::{Category, Manifest, Preferences, ResolutionGraph, ResolvedPackage};
use tether_warnings::warn_user_once;

use crate::content_hash::content_hash;
use crate::{LockError, LockErrorKind};

/// The lock format written by this version.
const LOCK_VERSION: &str = "2.0";

static LOCK_VERSION_PARSED: LazyLock<Version> = LazyLock::new(|| Version::new([2, 0]));

/// A lock: one pinned version per package, plus what the lock was computed from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "LockWire")]
pub struct Lock {
    /// The locked packages, sorted by name.
    packages: Vec<LockedPackage>,
    metadata: LockMetadata,
    /// A map from package name to index in `packages`.
    by_name: FxHashMap<PackageName, usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockMetadata {
    /// The format of the lock, as read. Always the current format for a new lock.
    pub lock_version: String,
    /// The project's `python-versions` at the time of locking.
    pub python_versions: VersionConstraint,
    /// The hash of the project's requirements at the time of locking.
    pub content_hash: String,
}

/// One `[[package]]` entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockedPackage {
    pub name: PackageName,
    pub version: Version,
    pub description: String,
    pub category: Category,
    pub optional: bool,
    pub python_versions: VersionConstraint,
    /// The environments in which the package is installed.
    pub markers: MarkerTree,
    /// Every dependency the package declares.
    pub dependencies: Vec<Dependency>,
    pub extras: BTreeMap<ExtraName, Vec<PackageName>>,
    /// The locked distribution files, sorted by file name.
    pub files: Vec<FileHash>,
}

impl From<&ResolvedPackage> for LockedPackage {
    fn from(package: &ResolvedPackage) -> Self {
        let mut files = package.files.clone();
        files.sort();
        Self {
            name: package.name.clone(),
            version: package.version.clone(),
            description: package.description.clone(),
            category: package.category,
            optional: package.optional,
            python_versions: package.python_versions.clone(),
            markers: package.marker.clone(),
            dependencies: package.dependencies.clone(),
            extras: package.extras.clone(),
            files,
        }
    }
}

/// The lock no longer matches the project's requirements.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "The lock file is out of date with the project requirements (content-hash `{locked}` does not match `{current}`)"
)]
pub struct StaleLock {
    pub locked: String,
    pub current: String,
}

impl Lock {
    /// Create a lock from packages, validating that they form a consistent graph.
    pub fn new(packages: Vec<LockedPackage>, metadata: LockMetadata) -> Result<Self, LockError> {
        let mut packages = packages;
        packages.sort_by(|a, b| a.name.cmp(&b.name));

        let mut by_name = FxHashMap::default();
        for (index, package) in packages.iter().enumerate() {
            if by_name.insert(package.name.clone(), index).is_some() {
                return Err(LockErrorKind::DuplicatePackage {
                    name: package.name.clone(),
                }
                .into());
            }
        }

        for package in &packages {
            for dependency in &package.dependencies {
                // Conditional and optional edges may have been left out of the resolution.
                if dependency.optional || !dependency.marker.is_true() {
                    continue;
                }
                if !by_name.contains_key(&dependency.name) {
                    return Err(LockErrorKind::UnrecognizedDependency {
                        name: package.name.clone(),
                        dependency: dependency.name.clone(),
                    }
                    .into());
                }
            }

            let declared: FxHashSet<&PackageName> = package
                .dependencies
                .iter()
                .map(|dependency| &dependency.name)
                .collect();
            for (extra, names) in &package.extras {
                if let Some(dependency) = names.iter().find(|name| !declared.contains(name)) {
                    return Err(LockErrorKind::UnknownExtraDependency {
                        name: package.name.clone(),
                        extra: extra.clone(),
                        dependency: dependency.clone(),
                    }
                    .into());
                }
            }
        }

        Ok(Self {
            packages,
            metadata,
            by_name,
        })
    }

    /// Lock a resolution of the given manifest.
    pub fn from_resolution(graph: &ResolutionGraph, manifest: &Manifest) -> Result<Self, LockError> {
        let packages = graph.packages().map(LockedPackage::from).collect();
        let metadata = LockMetadata {
            lock_version: LOCK_VERSION.to_string(),
            python_versions: manifest.python_versions().clone(),
            content_hash: content_hash(manifest),
        };
        Self::new(packages, metadata)
    }

    /// Parse and validate a lock.
    pub fn from_toml(text: &str) -> Result<Self, LockError> {
        Ok(toml::from_str(text)?)
    }

    /// The locked packages, sorted by name.
    pub fn packages(&self) -> &[LockedPackage] {
        &self.packages
    }

    pub fn metadata(&self) -> &LockMetadata {
        &self.metadata
    }

    /// Return the locked package with the given name.
    pub fn find(&self, name: &PackageName) -> Option<&LockedPackage> {
        self.by_name.get(name).map(|&index| &self.packages[index])
    }

    /// The direct requirements of the project and the locked packages that satisfy them: the
    /// roots of the dependency tree.
    pub fn roots<'a>(&'a self, manifest: &'a Manifest) -> impl Iterator<Item = &'a LockedPackage> {
        let mut seen = FxHashSet::default();
        manifest
            .dependencies()
            .iter()
            .chain(manifest.dev_dependencies())
            .filter_map(|dependency| self.find(&dependency.name))
            .filter(move |package| seen.insert(package.name.clone()))
    }

    /// Check that the lock was computed from the manifest's current requirements.
    pub fn check_fresh(&self, manifest: &Manifest) -> Result<(), StaleLock> {
        let current = content_hash(manifest);
        if current == self.metadata.content_hash {
            Ok(())
        } else {
            debug!(
                "Lock content-hash `{}` differs from `{current}`",
                self.metadata.content_hash
            );
            Err(StaleLock {
                locked: self.metadata.content_hash.clone(),
                current,
            })
        }
    }

    /// The locked versions, as preferences for a new resolution.
    pub fn preferences(&self) -> Preferences {
        self.packages
            .iter()
            .map(|package| (package.name.clone(), package.version.clone()))
            .collect()
    }

    /// Render the lock as TOML. The output only depends on the lock's contents.
    pub fn to_toml(&self) -> String {
        // We construct a TOML document manually instead of going through Serde to enable
        // the use of inline tables.
        let mut doc = toml_edit::DocumentMut::new();

        let mut packages = ArrayOfTables::new();
        for package in &self.packages {
            packages.push(package.to_toml());
        }
        doc.insert("package", Item::ArrayOfTables(packages));

        let mut metadata = Table::new();
        metadata.insert("lock-version", value(LOCK_VERSION));
        metadata.insert(
            "python-versions",
            value(self.metadata.python_versions.to_string()),
        );
        metadata.insert("content-hash", value(self.metadata.content_hash.as_str()));

        let mut files = Table::new();
        for package in &self.packages {
            let records = each_element_on_its_line_array(package.files.iter().map(|file| {
                let mut table = InlineTable::new();
                table.insert("file", Value::from(file.file.as_str()));
                table.insert("hash", Value::from(file.hash.to_string()));
                table
            }));
            files.insert(package.name.as_ref(), value(records));
        }
        metadata.insert("files", Item::Table(files));
        doc.insert("metadata", Item::Table(metadata));

        doc.to_string()
    }
}

impl FromStr for Lock {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_toml(s)
    }
}

impl LockedPackage {
    fn to_toml(&self) -> Table {
        let mut table = Table::new();
        table.insert("name", value(self.name.to_string()));
        table.insert("version", value(self.version.to_string()));
        table.insert("description", value(self.description.as_str()));
        table.insert("category", value(self.category.to_string()));
        table.insert("optional", value(self.optional));
        table.insert("python-versions", value(self.python_versions.to_string()));
        if let Some(markers) = self.markers.try_to_string() {
            table.insert("markers", value(markers));
        }

        if !self.dependencies.is_empty() {
            let mut dependencies = Table::new();
            for (name, spec) in dependencies_to_table(&self.dependencies) {
                let item = match spec {
                    DependencySpec::Constraint(version) => value(version.to_string()),
                    DependencySpec::Detailed(detailed) => value(detailed_to_toml(&detailed)),
                    DependencySpec::Multiple(all) => {
                        value(all.iter().map(detailed_to_toml).collect::<Array>())
                    }
                };
                dependencies.insert(name.as_ref(), item);
            }
            table.insert("dependencies", Item::Table(dependencies));
        }

        if !self.extras.is_empty() {
            let mut extras = Table::new();
            for (extra, names) in &self.extras {
                let names = names.iter().map(ToString::to_string).collect::<Array>();
                extras.insert(extra.as_ref(), value(names));
            }
            table.insert("extras", Item::Table(extras));
        }

        table
    }
}

fn detailed_to_toml(dependency: &DetailedDependency) -> InlineTable {
    let mut table = InlineTable::new();
    table.insert("version", Value::from(dependency.version.to_string()));
    if let Some(markers) = dependency.markers.try_to_string() {
        table.insert("markers", Value::from(markers));
    }
    if !dependency.extras.is_empty() {
        let extras = dependency
            .extras
            .iter()
            .map(ToString::to_string)
            .collect::<Array>();
        table.insert("extras", Value::Array(extras));
    }
    if dependency.optional {
        table.insert("optional", Value::from(true));
    }
    table
}

/// Returns an array with each element on its own line, indented.
fn each_element_on_its_line_array(elements: impl Iterator<Item = impl Into<Value>>) -> Array {
    let mut array = elements
        .map(|item| {
            let mut value = item.into();
            value.decor_mut().set_prefix("\n    ");
            value
        })
        .collect::<Array>();
    if !array.is_empty() {
        array.set_trailing_comma(true);
        array.set_trailing("\n");
    }
    array
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct LockWire {
    #[serde(rename = "package", default)]
    packages: Vec<PackageWire>,
    metadata: MetadataWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PackageWire {
    name: PackageName,
    version: Version,
    #[serde(default)]
    description: String,
    category: Category,
    #[serde(default)]
    optional: bool,
    #[serde(default = "VersionConstraint::any")]
    python_versions: VersionConstraint,
    #[serde(default)]
    markers: MarkerTree,
    #[serde(default, with = "dependency_table")]
    dependencies: Vec<Dependency>,
    #[serde(default)]
    extras: BTreeMap<ExtraName, Vec<PackageName>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct MetadataWire {
    lock_version: String,
    #[serde(default = "VersionConstraint::any")]
    python_versions: VersionConstraint,
    content_hash: String,
    #[serde(default)]
    files: BTreeMap<PackageName, Vec<FileHash>>,
}

impl TryFrom<LockWire> for Lock {
    type Error = LockError;

    fn try_from(wire: LockWire) -> Result<Self, LockError> {
        check_lock_version(&wire.metadata.lock_version)?;

        let mut files = wire.metadata.files;
        let packages: Vec<LockedPackage> = wire
            .packages
            .into_iter()
            .map(|package| {
                let mut files = files.remove(&package.name).unwrap_or_default();
                files.sort();
                LockedPackage {
                    name: package.name,
                    version: package.version,
                    description: package.description,
                    category: package.category,
                    optional: package.optional,
                    python_versions: package.python_versions,
                    markers: package.markers,
                    dependencies: package.dependencies,
                    extras: package.extras,
                    files,
                }
            })
            .collect();

        if let Some(name) = files.into_keys().find(|name| {
            // A second entry for a locked name is reported as a duplicate package instead.
            !packages.iter().any(|package| &package.name == name)
        }) {
            return Err(LockErrorKind::UnrecognizedFiles { name }.into());
        }

        Self::new(
            packages,
            LockMetadata {
                lock_version: wire.metadata.lock_version,
                python_versions: wire.metadata.python_versions,
                content_hash: wire.metadata.content_hash,
            },
        )
    }
}

/// Accept locks written in the current format, or a newer minor revision of it.
fn check_lock_version(lock_version: &str) -> Result<(), LockError> {
    let found =
        Version::from_str(lock_version).map_err(|err| LockErrorKind::InvalidLockVersion {
            version: lock_version.to_string(),
            err,
        })?;
    let expected = &*LOCK_VERSION_PARSED;
    let major = |version: &Version| version.release().first().copied().unwrap_or_default();
    if major(&found) != major(expected) {
        return Err(LockErrorKind::UnsupportedLockVersion {
            found,
            expected: expected.clone(),
        }
        .into());
    }
    if found > *expected {
        warn_user_once!(
            "The lock file was written in format {found}, which is newer than this version supports ({expected}); some fields may be ignored"
        );
    }
    Ok(())
}
