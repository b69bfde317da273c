use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use tether_normalize::{ExtraName, PackageName};
use tether_pep440::VersionConstraint;
use tether_pep508::{MarkerTree, Requirement};

/// A dependency edge as declared by a package version, a project manifest, or a lock entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub name: PackageName,
    pub version: VersionConstraint,
    /// The environments in which the edge applies. Always true if not declared.
    pub marker: MarkerTree,
    /// Extras requested on the target package.
    pub extras: Vec<ExtraName>,
    /// Whether the edge is only activated through an extra of the declaring package.
    pub optional: bool,
}

impl Dependency {
    /// A required dependency on any version of `name`.
    pub fn any(name: PackageName) -> Self {
        Self {
            name,
            version: VersionConstraint::any(),
            marker: MarkerTree::True,
            extras: Vec::new(),
            optional: false,
        }
    }

    /// Whether the declaration fits in a bare constraint string.
    fn is_simple(&self) -> bool {
        self.marker.is_true() && self.extras.is_empty() && !self.optional
    }

    /// The dependency specifier for this edge, without the `optional` flag.
    pub fn to_requirement(&self) -> Requirement {
        Requirement {
            name: self.name.clone(),
            extras: self.extras.clone(),
            version: self.version.clone(),
            marker: self.marker.clone(),
        }
    }
}

impl From<Requirement> for Dependency {
    fn from(requirement: Requirement) -> Self {
        Self {
            name: requirement.name,
            version: requirement.version,
            marker: requirement.marker,
            extras: requirement.extras,
            optional: false,
        }
    }
}

/// The on-disk form of the dependencies of one name.
///
/// ```toml
/// attrs = ">=19,<21"
/// pywin32 = { version = ">=300", markers = "sys_platform == 'win32'" }
/// numpy = [
///     { version = "<1.22", markers = "python_version < '3.8'" },
///     { version = ">=1.22", markers = "python_version >= '3.8'" },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Constraint(VersionConstraint),
    Detailed(DetailedDependency),
    Multiple(Vec<DetailedDependency>),
}

/// A dependency declared as a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailedDependency {
    #[serde(default = "VersionConstraint::any")]
    pub version: VersionConstraint,
    #[serde(default, skip_serializing_if = "MarkerTree::is_true")]
    pub markers: MarkerTree,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<ExtraName>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl DetailedDependency {
    fn into_dependency(self, name: PackageName) -> Dependency {
        Dependency {
            name,
            version: self.version,
            marker: self.markers,
            extras: self.extras,
            optional: self.optional,
        }
    }
}

impl From<&Dependency> for DetailedDependency {
    fn from(dependency: &Dependency) -> Self {
        Self {
            version: dependency.version.clone(),
            markers: dependency.marker.clone(),
            extras: dependency.extras.clone(),
            optional: dependency.optional,
        }
    }
}

/// Expand a `name → spec` table into dependency edges, ordered by name.
pub fn dependencies_from_table(table: BTreeMap<PackageName, DependencySpec>) -> Vec<Dependency> {
    let mut dependencies = Vec::with_capacity(table.len());
    for (name, spec) in table {
        match spec {
            DependencySpec::Constraint(version) => dependencies.push(Dependency {
                version,
                ..Dependency::any(name)
            }),
            DependencySpec::Detailed(detailed) => {
                dependencies.push(detailed.into_dependency(name));
            }
            DependencySpec::Multiple(all) => {
                dependencies.extend(
                    all.into_iter()
                        .map(|detailed| detailed.into_dependency(name.clone())),
                );
            }
        }
    }
    dependencies
}

/// Group dependency edges into a `name → spec` table, using the shortest form for each name.
pub fn dependencies_to_table(dependencies: &[Dependency]) -> BTreeMap<PackageName, DependencySpec> {
    let mut grouped: BTreeMap<PackageName, Vec<&Dependency>> = BTreeMap::new();
    for dependency in dependencies {
        grouped
            .entry(dependency.name.clone())
            .or_default()
            .push(dependency);
    }
    grouped
        .into_iter()
        .map(|(name, edges)| {
            let spec = match edges.as_slice() {
                [single] if single.is_simple() => DependencySpec::Constraint(single.version.clone()),
                [single] => DependencySpec::Detailed(DetailedDependency::from(*single)),
                edges => DependencySpec::Multiple(
                    edges
                        .iter()
                        .map(|edge| DetailedDependency::from(*edge))
                        .collect(),
                ),
            };
            (name, spec)
        })
        .collect()
}

/// Serde adapter for a `Vec<Dependency>` stored as a `name → spec` table.
pub mod dependency_table {
    use super::{
        BTreeMap, Dependency, DependencySpec, Deserialize, Deserializer, PackageName, Serialize,
        Serializer, dependencies_from_table, dependencies_to_table,
    };

    pub fn serialize<S>(dependencies: &[Dependency], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        dependencies_to_table(dependencies).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Dependency>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let table = BTreeMap::<PackageName, DependencySpec>::deserialize(deserializer)?;
        Ok(dependencies_from_table(table))
    }
}

/// The metadata a provider reports for one version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageMetadata {
    #[serde(default)]
    pub description: String,
    /// The interpreter versions the package supports.
    #[serde(default = "VersionConstraint::any")]
    pub python_versions: VersionConstraint,
    #[serde(default, with = "dependency_table")]
    pub dependencies: Vec<Dependency>,
    /// Maps each extra to the optional dependencies it activates.
    #[serde(default)]
    pub extras: BTreeMap<ExtraName, Vec<PackageName>>,
}

impl Default for PackageMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            python_versions: VersionConstraint::any(),
            dependencies: Vec::new(),
            extras: BTreeMap::new(),
        }
    }
}

impl PackageMetadata {
    /// The dependency edges that apply when the given extras of this package are requested:
    /// every required edge, plus the optional edges named by a requested extra.
    ///
    /// Edges gated by an `extra == '...'` marker are returned as well; their marker decides.
    pub fn requirements_for<'a>(
        &'a self,
        extras: &'a [ExtraName],
    ) -> impl Iterator<Item = &'a Dependency> + 'a {
        self.dependencies.iter().filter(move |dependency| {
            !dependency.optional
                || extras.iter().any(|extra| {
                    self.extras
                        .get(extra)
                        .is_some_and(|names| names.contains(&dependency.name))
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indoc::indoc;

    use tether_normalize::{ExtraName, PackageName};
    use tether_pep440::VersionConstraint;
    use tether_pep508::MarkerTree;

    use super::{Dependency, PackageMetadata, dependencies_to_table};

    #[test]
    fn all_dependency_forms() {
        let metadata: PackageMetadata = toml::from_str(indoc! {r#"
            description = "Python port of markdown-it"
            python-versions = "~=3.6"

            [dependencies]
            attrs = ">=19,<21"
            pywin32 = { version = ">=300", markers = "sys_platform == 'win32'" }
            rich = { version = "*", optional = true, extras = ["jupyter"] }
            numpy = [
                { version = "<1.22", markers = "python_version < '3.8'" },
                { version = ">=1.22", markers = "python_version >= '3.8'" },
            ]

            [extras]
            pretty = ["rich"]
        "#})
        .unwrap();

        let names: Vec<&str> = metadata
            .dependencies
            .iter()
            .map(|dependency| dependency.name.as_str())
            .collect();
        assert_eq!(names, ["attrs", "numpy", "numpy", "pywin32", "rich"]);
        assert_eq!(
            metadata.python_versions,
            VersionConstraint::from_str("~=3.6").unwrap()
        );

        let pywin32 = &metadata.dependencies[3];
        assert_eq!(
            pywin32.marker,
            MarkerTree::from_str("sys_platform == 'win32'").unwrap()
        );
        let rich = &metadata.dependencies[4];
        assert!(rich.optional);
        assert!(rich.version.is_any());
        assert_eq!(rich.extras, [ExtraName::from_str("jupyter").unwrap()]);

        // Round trip through the shortest forms.
        let table = dependencies_to_table(&metadata.dependencies);
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["attrs"], ">=19,<21");
        assert_eq!(json["numpy"].as_array().unwrap().len(), 2);
        assert_eq!(json["rich"]["optional"], true);
    }

    #[test]
    fn optional_dependencies_follow_extras() {
        let metadata: PackageMetadata = serde_json::from_str(
            r#"{
                "dependencies": {"attrs": "*", "rich": {"optional": true}},
                "extras": {"pretty": ["rich"]}
            }"#,
        )
        .unwrap();
        assert!(metadata.python_versions.is_any());

        let names = |extras: &[ExtraName]| -> Vec<String> {
            metadata
                .requirements_for(extras)
                .map(|dependency| dependency.name.to_string())
                .collect()
        };
        assert_eq!(names(&[]), ["attrs"]);
        assert_eq!(
            names(&[ExtraName::from_str("pretty").unwrap()]),
            ["attrs", "rich"]
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<PackageMetadata, _> =
            serde_json::from_str(r#"{"dependencies": {"attrs": {"verison": ">=19"}}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn requirement_round_trip() {
        let dependency = Dependency::from(
            tether_pep508::Requirement::from_str("attrs[tests] >=19 ; python_version < '3.8'")
                .unwrap(),
        );
        assert_eq!(dependency.name, PackageName::from_str("attrs").unwrap());
        assert!(!dependency.optional);
        assert_eq!(
            dependency.to_requirement().to_string(),
            "attrs[tests] >=19 ; python_version < '3.8'"
        );
    }
}
