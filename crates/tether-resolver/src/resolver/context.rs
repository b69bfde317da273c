use std::collections::{BTreeSet, VecDeque};
use std::hash::BuildHasherDefault;

use indexmap::IndexMap;
use rustc_hash::{FxHashSet, FxHasher};
use version_ranges::Ranges;

use tether_normalize::{ExtraName, PackageName};
use tether_pep440::{Version, VersionConstraint};

use crate::{Cause, Conflict, ConflictKind, Origin};

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// A constraint on a package and the decision it came from.
#[derive(Debug, Clone)]
pub(crate) struct Incoming {
    pub(crate) origin: Origin,
    pub(crate) version: VersionConstraint,
    pub(crate) extras: Vec<ExtraName>,
}

/// Everything the search knows about one package name.
#[derive(Debug, Clone)]
pub(crate) struct Term {
    /// The intersection of every incoming constraint.
    pub(crate) range: Ranges<Version>,
    pub(crate) incoming: Vec<Incoming>,
    /// The union of the extras requested by every incoming edge.
    pub(crate) extras: BTreeSet<ExtraName>,
    /// The interpreter versions for which the package is needed.
    pub(crate) python: Ranges<Version>,
    pub(crate) assignment: Option<Version>,
}

impl Default for Term {
    fn default() -> Self {
        Self {
            range: Ranges::full(),
            incoming: Vec::new(),
            extras: BTreeSet::new(),
            python: Ranges::empty(),
            assignment: None,
        }
    }
}

impl Term {
    /// The incoming constraints, as reported in a conflict.
    pub(crate) fn causes(&self, name: &PackageName) -> Vec<Cause> {
        self.incoming
            .iter()
            .map(|incoming| Cause {
                origin: incoming.origin.clone(),
                name: name.clone(),
                extras: incoming.extras.clone(),
                version: incoming.version.clone(),
            })
            .collect()
    }

    pub(crate) fn conflict(&self, name: &PackageName, kind: ConflictKind) -> Conflict {
        Conflict {
            package: name.clone(),
            kind,
            causes: self.causes(name),
        }
    }

    pub(crate) fn extras(&self) -> Vec<ExtraName> {
        self.extras.iter().cloned().collect()
    }
}

/// The mutable state of the search: the constraint store and the partial assignment, keyed by
/// package name in discovery order. Names without an assignment form the frontier.
///
/// Each decision works on its own copy, so undoing a decision is dropping the copy.
#[derive(Debug, Clone, Default)]
pub(crate) struct SearchContext {
    terms: FxIndexMap<PackageName, Term>,
}

impl SearchContext {
    /// Return the term for a name, creating it if the name is new. The flag is `true` if the name
    /// was discovered by this call.
    pub(crate) fn term_mut(&mut self, name: &PackageName) -> (&mut Term, bool) {
        let discovered = !self.terms.contains_key(name);
        (self.terms.entry(name.clone()).or_default(), discovered)
    }

    pub(crate) fn term(&self, name: &PackageName) -> Option<&Term> {
        self.terms.get(name)
    }

    /// The names without an assignment, in discovery order.
    pub(crate) fn frontier(&self) -> impl Iterator<Item = (&PackageName, &Term)> {
        self.terms
            .iter()
            .filter(|(_, term)| term.assignment.is_none())
    }

    /// Every assigned name and version, in discovery order.
    pub(crate) fn assignments(&self) -> impl Iterator<Item = (&PackageName, &Version, &Term)> {
        self.terms.iter().filter_map(|(name, term)| {
            term.assignment
                .as_ref()
                .map(|version| (name, version, term))
        })
    }

    /// The decisions that may have caused a failure involving the given names: the names
    /// themselves and every package that declared an edge leading to them, transitively.
    pub(crate) fn culprits<'a>(
        &self,
        involved: impl IntoIterator<Item = &'a PackageName>,
    ) -> FxHashSet<PackageName> {
        let mut culprits = FxHashSet::default();
        let mut queue: VecDeque<&PackageName> = involved.into_iter().collect();
        while let Some(name) = queue.pop_front() {
            if !culprits.insert(name.clone()) {
                continue;
            }
            let Some(term) = self.terms.get(name) else {
                continue;
            };
            for incoming in &term.incoming {
                if let Some(origin) = incoming.origin.package() {
                    if !culprits.contains(origin) {
                        queue.push_back(origin);
                    }
                }
            }
        }
        culprits
    }
}

/// A decision point: the name being decided, the state before the decision, and the candidates
/// not tried yet.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) name: PackageName,
    pub(crate) snapshot: SearchContext,
    pub(crate) remaining: VecDeque<Version>,
    /// Earlier decisions that contributed to the rejection of a candidate of this frame, or of
    /// a later frame that jumped back here.
    pub(crate) conflict_set: FxHashSet<PackageName>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use tether_normalize::PackageName;
    use tether_pep440::{Version, VersionConstraint};

    use super::{Incoming, SearchContext};
    use crate::Origin;

    fn name(name: &str) -> PackageName {
        PackageName::from_str(name).unwrap()
    }

    fn edge(context: &mut SearchContext, origin: Origin, target: &str) {
        let (term, _) = context.term_mut(&name(target));
        term.incoming.push(Incoming {
            origin,
            version: VersionConstraint::any(),
            extras: Vec::new(),
        });
    }

    #[test]
    fn culprits_follow_origins() {
        let mut context = SearchContext::default();
        let one = Version::new([1]);
        edge(&mut context, Origin::Root, "a");
        edge(&mut context, Origin::Root, "unrelated");
        edge(&mut context, Origin::Package(name("a"), one.clone()), "b");
        edge(&mut context, Origin::Package(name("b"), one.clone()), "c");
        edge(&mut context, Origin::Package(name("c"), one), "b");

        let culprits = context.culprits([&name("c")]);
        let mut culprits: Vec<&str> = culprits.iter().map(PackageName::as_str).collect();
        culprits.sort_unstable();
        assert_eq!(culprits, ["a", "b", "c"]);
    }

    #[test]
    fn discovery_order() {
        let mut context = SearchContext::default();
        assert!(context.term_mut(&name("b")).1);
        assert!(context.term_mut(&name("a")).1);
        assert!(!context.term_mut(&name("b")).1);
        context.term_mut(&name("b")).0.assignment = Some(Version::new([1]));

        let frontier: Vec<&str> = context.frontier().map(|(name, _)| name.as_str()).collect();
        assert_eq!(frontier, ["a"]);
        let assigned: Vec<&str> = context
            .assignments()
            .map(|(name, _, _)| name.as_str())
            .collect();
        assert_eq!(assigned, ["b"]);
    }
}
