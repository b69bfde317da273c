use std::fmt::Write;

use rustc_hash::{FxHashMap, FxHashSet};

use tether_normalize::PackageName;
use tether_pypi_types::Dependency;

use crate::{Lock, LockedPackage};

/// Render the locked dependency graph as a tree, starting from the given roots.
#[derive(Debug)]
pub struct TreeDisplay<'env> {
    lock: &'env Lock,
    roots: Vec<&'env LockedPackage>,
    /// Maximum display depth of the dependency tree.
    depth: usize,
}

impl<'env> TreeDisplay<'env> {
    /// Create a tree for the given roots. Without roots, the packages that no other locked
    /// package depends on are used.
    pub fn new(lock: &'env Lock, roots: Vec<&'env LockedPackage>, depth: usize) -> Self {
        let roots = if roots.is_empty() {
            let dependents: FxHashSet<&PackageName> = lock
                .packages()
                .iter()
                .flat_map(|package| package.dependencies.iter())
                .map(|dependency| &dependency.name)
                .collect();
            lock.packages()
                .iter()
                .filter(|package| !dependents.contains(&package.name))
                .collect()
        } else {
            roots
        };
        Self { lock, roots, depth }
    }

    fn visit(
        &self,
        package: &'env LockedPackage,
        edge: Option<&'env Dependency>,
        visited: &mut FxHashMap<&'env PackageName, bool>,
        path: &mut Vec<&'env PackageName>,
    ) -> Vec<String> {
        // Short-circuit if the current path is longer than the provided depth.
        if path.len() > self.depth {
            return Vec::new();
        }

        let mut line = package.name.to_string();
        if let Some(edge) = edge {
            if !edge.extras.is_empty() {
                let extras: Vec<String> = edge.extras.iter().map(ToString::to_string).collect();
                let _ = write!(line, "[{}]", extras.join(", "));
            }
        }
        let _ = write!(line, " v{}", package.version);
        if let Some(marker) = edge.and_then(|edge| edge.marker.contents()) {
            let _ = write!(line, " ; {marker}");
        }

        // Skip the traversal if the package is part of a cycle, or was already displayed.
        if let Some(&has_dependencies) = visited.get(&package.name) {
            return if has_dependencies {
                vec![format!("{line} (*)")]
            } else {
                vec![line]
            };
        }

        let mut dependencies: Vec<(&'env LockedPackage, &'env Dependency)> = package
            .dependencies
            .iter()
            .filter_map(|dependency| Some((self.lock.find(&dependency.name)?, dependency)))
            .collect();
        dependencies.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name));

        let mut lines = vec![line];
        visited.insert(&package.name, !dependencies.is_empty());
        path.push(&package.name);

        for (index, (dependency, edge)) in dependencies.iter().enumerate() {
            let (prefix_top, prefix_rest) = if dependencies.len() - 1 == index {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            for (visited_index, visited_line) in self
                .visit(dependency, Some(edge), visited, path)
                .iter()
                .enumerate()
            {
                let prefix = if visited_index == 0 {
                    prefix_top
                } else {
                    prefix_rest
                };
                lines.push(format!("{prefix}{visited_line}"));
            }
        }

        path.pop();

        lines
    }

    /// Depth-first traverse the nodes to render the tree.
    fn render(&self) -> Vec<String> {
        let mut path = Vec::new();
        let mut lines = Vec::with_capacity(self.lock.packages().len());
        let mut visited = FxHashMap::default();

        for package in &self.roots {
            path.clear();
            lines.extend(self.visit(package, None, &mut visited, &mut path));
        }

        lines
    }
}

impl std::fmt::Display for TreeDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut deduped = false;
        for line in self.render() {
            deduped |= line.ends_with("(*)");
            writeln!(f, "{line}")?;
        }

        if deduped {
            writeln!(f, "(*) Package tree already displayed")?;
        }

        Ok(())
    }
}
