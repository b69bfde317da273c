use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tether_normalize::{ExtraName, PackageName};
use tether_pep440::{Version, VersionConstraint};
use tether_pep508::MarkerTree;
use tether_pypi_types::{Dependency, FileHash};

use crate::resolver::Selection;
use crate::{Manifest, PythonRequirement, ResolverEnvironment};

/// Whether a package is needed by the project itself or only for development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Main,
    Dev,
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Dev => f.write_str("dev"),
        }
    }
}

/// A package pinned by the resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: PackageName,
    pub version: Version,
    pub description: String,
    pub category: Category,
    /// Whether the package is only needed through an extra of the project.
    pub optional: bool,
    pub python_versions: VersionConstraint,
    /// Every dependency the package declares, including those that don't apply in the
    /// resolved environments.
    pub dependencies: Vec<Dependency>,
    /// The extras the package declares.
    pub extras: BTreeMap<ExtraName, Vec<PackageName>>,
    /// The environments in which the package has to be installed.
    pub marker: MarkerTree,
    pub files: Vec<FileHash>,
}

#[derive(Debug, Clone)]
enum Node {
    Root,
    Package(ResolvedPackage),
}

#[derive(Debug, Clone)]
struct Edge {
    marker: MarkerTree,
    /// For edges from the root: the category of the requirement and whether it belongs to an
    /// extra of the project.
    root: Option<(Category, bool)>,
}

/// A complete resolution: one version per package and the edges between them.
#[derive(Debug)]
pub struct ResolutionGraph {
    petgraph: DiGraph<Node, Edge>,
    root: NodeIndex,
    /// The packages by name, in name order.
    packages: BTreeMap<PackageName, NodeIndex>,
}

impl ResolutionGraph {
    pub(crate) fn from_selection(
        selection: Selection,
        mut files: FxHashMap<PackageName, Vec<FileHash>>,
        manifest: &Manifest,
        environment: &ResolverEnvironment,
        python_requirement: &PythonRequirement,
    ) -> Self {
        let mut petgraph = DiGraph::new();
        let root = petgraph.add_node(Node::Root);

        let mut packages = BTreeMap::new();
        for package in &selection.packages {
            let index = petgraph.add_node(Node::Package(ResolvedPackage {
                name: package.name.clone(),
                version: package.version.clone(),
                description: package.metadata.description.clone(),
                category: Category::Main,
                optional: false,
                python_versions: package.metadata.python_versions.clone(),
                dependencies: package.metadata.dependencies.clone(),
                extras: package.metadata.extras.clone(),
                marker: MarkerTree::True,
                files: files.remove(&package.name).unwrap_or_default(),
            }));
            packages.insert(package.name.clone(), index);
        }

        let root_extras = manifest.extra_names();
        for (category, dependency) in manifest.root_requirements() {
            let Some(&target) = packages.get(&dependency.name) else {
                continue;
            };
            let marker = dependency.marker.clone().simplify_extras(&root_extras);
            if marker.is_false() {
                continue;
            }
            petgraph.add_edge(
                root,
                target,
                Edge {
                    marker,
                    root: Some((category, dependency.optional)),
                },
            );
        }

        for package in &selection.packages {
            let Some(&source) = packages.get(&package.name) else {
                continue;
            };
            for dependency in &package.edges {
                let Some(&target) = packages.get(&dependency.name) else {
                    continue;
                };
                let marker = dependency.marker.clone().simplify_extras(&package.extras);
                petgraph.add_edge(source, target, Edge { marker, root: None });
            }
        }

        let mut graph = Self {
            petgraph,
            root,
            packages,
        };
        graph.propagate_markers(environment, python_requirement);
        graph.assign_categories();
        graph
    }

    /// Compute the environments in which each package is needed: the disjunction, over every
    /// path from the root, of the conjunction of the edge markers along the path.
    ///
    /// Packages in a cycle share one marker, taken from the edges that enter the cycle.
    fn propagate_markers(
        &mut self,
        environment: &ResolverEnvironment,
        python_requirement: &PythonRequirement,
    ) {
        let mut markers: FxHashMap<NodeIndex, MarkerTree> = FxHashMap::default();
        markers.insert(self.root, MarkerTree::True);

        // Strongly connected components, in reverse topological order.
        let components = tarjan_scc(&self.petgraph);
        for component in components.iter().rev() {
            if component.contains(&self.root) {
                continue;
            }
            let members: FxHashSet<NodeIndex> = component.iter().copied().collect();
            // Visit the edges entering the component in insertion order, so the marker reads in
            // declaration order.
            let mut incoming: Vec<_> = component
                .iter()
                .flat_map(|&node| self.petgraph.edges_directed(node, Direction::Incoming))
                .filter(|edge| !members.contains(&edge.source()))
                .collect();
            incoming.sort_by_key(|edge| edge.id());

            let mut marker = MarkerTree::disjunction(incoming.into_iter().filter_map(|edge| {
                let source = markers.get(&edge.source())?;
                Some(MarkerTree::conjunction([
                    source.clone(),
                    edge.weight().marker.clone(),
                ]))
            }));
            if matches!(environment, ResolverEnvironment::Universal) {
                marker = marker.simplify_python_versions(python_requirement.range().clone());
            }
            for &node in component {
                markers.insert(node, marker.clone());
            }
        }

        for (node, marker) in markers {
            if let Node::Package(package) = &mut self.petgraph[node] {
                package.marker = marker;
            }
        }
    }

    /// A package is `main` if a main requirement of the project reaches it, and `optional` if
    /// only requirements that belong to an extra of the project reach it.
    fn assign_categories(&mut self) {
        let main = self.reachable(|category, _| category == Category::Main);
        let required = self.reachable(|_, optional| !optional);

        for &index in self.packages.values() {
            if let Node::Package(package) = &mut self.petgraph[index] {
                package.category = if main.contains(&index) {
                    Category::Main
                } else {
                    Category::Dev
                };
                package.optional = !required.contains(&index);
            }
        }
    }

    /// The nodes reachable through the root requirements that match `filter`.
    fn reachable(&self, filter: impl Fn(Category, bool) -> bool) -> FxHashSet<NodeIndex> {
        let mut visited = FxHashSet::default();
        let mut queue: Vec<NodeIndex> = self
            .petgraph
            .edges(self.root)
            .filter(|edge| {
                edge.weight()
                    .root
                    .is_some_and(|(category, optional)| filter(category, optional))
            })
            .map(|edge| edge.target())
            .collect();
        while let Some(node) = queue.pop() {
            if !visited.insert(node) {
                continue;
            }
            queue.extend(self.petgraph.neighbors(node));
        }
        visited
    }

    /// The pinned packages, in name order.
    pub fn packages(&self) -> impl Iterator<Item = &ResolvedPackage> {
        self.packages
            .values()
            .filter_map(|&index| match &self.petgraph[index] {
                Node::Package(package) => Some(package),
                Node::Root => None,
            })
    }

    /// Return the pinned package with the given name.
    pub fn get(&self, name: &PackageName) -> Option<&ResolvedPackage> {
        match &self.petgraph[*self.packages.get(name)?] {
            Node::Package(package) => Some(package),
            Node::Root => None,
        }
    }

    /// The resolved dependencies of a package and the marker of each edge.
    pub fn dependencies(
        &self,
        name: &PackageName,
    ) -> impl Iterator<Item = (&ResolvedPackage, &MarkerTree)> {
        self.packages
            .get(name)
            .into_iter()
            .flat_map(|&index| self.petgraph.edges(index))
            .filter_map(|edge| match &self.petgraph[edge.target()] {
                Node::Package(package) => Some((package, &edge.weight().marker)),
                Node::Root => None,
            })
    }

    /// The number of pinned packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Log the resolution at debug level.
    pub fn log(&self) {
        for package in self.packages() {
            match package.marker.try_to_string() {
                Some(marker) => debug!("Resolved {}=={} ; {marker}", package.name, package.version),
                None => debug!("Resolved {}=={}", package.name, package.version),
            }
        }
    }
}
