//! The project manifest, `tether.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use tether_fs::Simplified;
use tether_normalize::{ExtraName, PackageName};
use tether_pep440::VersionConstraint;
use tether_pypi_types::{Dependency, dependency_table};
use tether_resolver::{Manifest, PrereleaseMode, ResolutionMode};

pub(crate) const MANIFEST_NAME: &str = "tether.toml";
pub(crate) const LOCK_NAME: &str = "tether.lock";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ManifestError {
    #[error("No `tether.toml` found in `{}`", .0.user_display())]
    Missing(PathBuf),

    #[error("Failed to read `{}`", path.user_display())]
    Read {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("Failed to parse `{}`", path.user_display())]
    Parse {
        path: PathBuf,
        #[source]
        err: toml::de::Error,
    },

    #[error("Extra `{extra}` refers to `{name}`, which is not in `[dependencies]`")]
    UnknownExtraDependency { extra: ExtraName, name: PackageName },
}

/// A `tether.toml` file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct ProjectManifest {
    pub(crate) project: ProjectTable,
    #[serde(default, with = "dependency_table")]
    pub(crate) dependencies: Vec<Dependency>,
    #[serde(default, with = "dependency_table")]
    pub(crate) dev_dependencies: Vec<Dependency>,
    /// Maps each project extra to the optional dependencies it activates.
    #[serde(default)]
    pub(crate) extras: BTreeMap<ExtraName, Vec<PackageName>>,
    #[serde(default)]
    pub(crate) tool: Option<Tool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct ProjectTable {
    pub(crate) name: PackageName,
    #[serde(default = "VersionConstraint::any")]
    pub(crate) python_versions: VersionConstraint,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Tool {
    pub(crate) tether: Option<ToolTether>,
}

/// The `[tool.tether]` table. Command-line flags take precedence over these settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct ToolTether {
    pub(crate) resolution: Option<ResolutionMode>,
    pub(crate) prerelease: Option<PrereleaseMode>,
    /// The offline package index, relative to the project directory.
    pub(crate) index: Option<PathBuf>,
}

impl ProjectManifest {
    pub(crate) fn from_toml(contents: &str, path: &Path) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(contents).map_err(|err| ManifestError::Parse {
            path: path.to_path_buf(),
            err,
        })?;

        for (extra, names) in &manifest.extras {
            if let Some(name) = names.iter().find(|name| {
                !manifest
                    .dependencies
                    .iter()
                    .any(|dependency| &dependency.name == *name)
            }) {
                return Err(ManifestError::UnknownExtraDependency {
                    extra: extra.clone(),
                    name: name.clone(),
                });
            }
        }

        Ok(manifest)
    }
}

/// A project: a directory with a `tether.toml`.
#[derive(Debug, Clone)]
pub(crate) struct Project {
    root: PathBuf,
    manifest: ProjectManifest,
}

impl Project {
    /// Read the project in the given directory.
    pub(crate) fn discover(root: &Path) -> Result<Self, ManifestError> {
        let path = root.join(MANIFEST_NAME);
        let contents = match fs_err::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::Missing(root.to_path_buf()));
            }
            Err(err) => return Err(ManifestError::Read { path, err }),
        };
        let manifest = ProjectManifest::from_toml(&contents, &path)?;
        debug!(
            "Found project `{}` at `{}`",
            manifest.project.name,
            root.user_display()
        );
        Ok(Self {
            root: root.to_path_buf(),
            manifest,
        })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_NAME)
    }

    /// The `[tool.tether]` settings, or the defaults if absent.
    pub(crate) fn settings(&self) -> ToolTether {
        self.manifest
            .tool
            .as_ref()
            .and_then(|tool| tool.tether.clone())
            .unwrap_or_default()
    }

    /// The requirements to resolve.
    ///
    /// Dependencies named by a project extra are optional, whether or not they were declared
    /// with `optional = true`.
    pub(crate) fn to_manifest(&self) -> Manifest {
        let optional: Vec<&PackageName> = self.manifest.extras.values().flatten().collect();
        let dependencies = self
            .manifest
            .dependencies
            .iter()
            .cloned()
            .map(|mut dependency| {
                dependency.optional |= optional.contains(&&dependency.name);
                dependency
            })
            .collect();
        Manifest::new(
            dependencies,
            self.manifest.dev_dependencies.clone(),
            self.manifest.project.python_versions.clone(),
            self.manifest.extras.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::str::FromStr;

    use indoc::indoc;

    use tether_normalize::PackageName;
    use tether_resolver::{PrereleaseMode, ResolutionMode};

    use super::{ManifestError, Project, ProjectManifest};

    const MANIFEST: &str = indoc! {r#"
        [project]
        name = "demo"
        python-versions = "^3.7"

        [dependencies]
        markdown-it-py = "~=0.6.1"
        pywin32 = { version = ">=300", markers = "sys_platform == 'win32'" }
        rich = { version = "*", optional = true }

        [dev-dependencies]
        pytest = "^6.0"

        [extras]
        pretty = ["rich"]

        [tool.tether]
        resolution = "lowest-direct"
        prerelease = "allow"
        index = "index.json"
    "#};

    #[test]
    fn parse() {
        let manifest = ProjectManifest::from_toml(MANIFEST, Path::new(MANIFEST_PATH)).unwrap();
        assert_eq!(manifest.project.name.as_ref(), "demo");
        assert_eq!(manifest.dependencies.len(), 3);
        assert_eq!(manifest.dev_dependencies.len(), 1);

        let pywin32 = &manifest.dependencies[1];
        assert_eq!(pywin32.name.as_ref(), "pywin32");
        assert_eq!(
            pywin32.marker.try_to_string().as_deref(),
            Some("sys_platform == 'win32'")
        );

        let tether = manifest.tool.unwrap().tether.unwrap();
        assert_eq!(tether.resolution, Some(ResolutionMode::LowestDirect));
        assert_eq!(tether.prerelease, Some(PrereleaseMode::Allow));
        assert_eq!(tether.index.unwrap(), Path::new("index.json"));
    }

    const MANIFEST_PATH: &str = "/project/tether.toml";

    #[test]
    fn extras_mark_optional() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(
            dir.path().join("tether.toml"),
            MANIFEST.replace("optional = true", "optional = false"),
        )
        .unwrap();

        let project = Project::discover(dir.path()).unwrap();
        let manifest = project.to_manifest();
        let rich = manifest
            .dependencies()
            .iter()
            .find(|dependency| dependency.name == PackageName::from_str("rich").unwrap())
            .unwrap();
        assert!(rich.optional);
        assert!(manifest.dependencies()[0].name.as_ref() == "markdown-it-py");
        assert!(!manifest.dependencies()[0].optional);
        assert_eq!(manifest.python_versions().to_string(), ">=3.7,<4.0");
        assert_eq!(project.lock_path(), dir.path().join("tether.lock"));
    }

    #[test]
    fn unknown_extra() {
        let contents = MANIFEST.replace(r#"pretty = ["rich"]"#, r#"pretty = ["colorama"]"#);
        let err = ProjectManifest::from_toml(&contents, Path::new(MANIFEST_PATH)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Extra `pretty` refers to `colorama`, which is not in `[dependencies]`"
        );
    }

    #[test]
    fn unknown_setting() {
        let contents = MANIFEST.replace("index = ", "indexes = ");
        let err = ProjectManifest::from_toml(&contents, Path::new(MANIFEST_PATH)).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Project::discover(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::Missing(_)));
        assert!(err.to_string().starts_with("No `tether.toml` found in"));
    }
}
