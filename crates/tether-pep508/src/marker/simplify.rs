//! Evaluating markers without a concrete environment.
//!
//! A lock file covers every environment the project supports, so the resolver can't evaluate
//! `sys_platform == 'win32'` to a boolean. Instead it asks whether a marker always holds, never
//! holds, or depends on the environment, given what it does know: the project's Python range and
//! the extras that are active.

use rustc_hash::FxHashMap;
use version_ranges::Ranges;

use tether_normalize::ExtraName;
use tether_pep440::{Operator, Version, VersionSpecifier};

use crate::{
    ExtraOperator, MarkerExpression, MarkerOperator, MarkerTree, MarkerValueExtra,
    MarkerValueVersion,
};

/// The outcome of evaluating a marker without a concrete environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolicMarker {
    /// The marker holds in every environment in scope.
    Always,
    /// The marker holds in no environment in scope.
    Never,
    /// The marker depends on the environment. Holds the residual, simplified marker.
    Conditional(MarkerTree),
}

impl SymbolicMarker {
    /// Convert back into a tree, using constants for the decided cases.
    pub fn into_tree(self) -> MarkerTree {
        match self {
            Self::Always => MarkerTree::True,
            Self::Never => MarkerTree::False,
            Self::Conditional(tree) => tree,
        }
    }
}

/// What is known about the target environments when no concrete environment is bound.
#[derive(Debug, Clone, Default)]
pub struct MarkerContext {
    python_versions: Option<Ranges<Version>>,
    extras: Option<Vec<ExtraName>>,
}

impl MarkerContext {
    /// Bound `python_version` and `python_full_version` to the given range of full versions.
    #[must_use]
    pub fn with_python_versions(mut self, python_versions: Ranges<Version>) -> Self {
        self.python_versions = Some(python_versions);
        self
    }

    /// Decide `extra` expressions: the given extras are active, all others are not.
    #[must_use]
    pub fn with_extras(mut self, extras: Vec<ExtraName>) -> Self {
        self.extras = Some(extras);
        self
    }
}

impl MarkerTree {
    /// Evaluate the marker without an environment: constant comparisons and contradictions are
    /// decided, everything else remains conditional.
    pub fn evaluate_symbolic(&self) -> SymbolicMarker {
        self.evaluate_symbolic_with(&MarkerContext::default())
    }

    /// Like [`MarkerTree::evaluate_symbolic`], additionally deciding what the context pins down.
    pub fn evaluate_symbolic_with(&self, context: &MarkerContext) -> SymbolicMarker {
        match simplify(self.clone(), context) {
            Self::True => SymbolicMarker::Always,
            Self::False => SymbolicMarker::Never,
            tree => SymbolicMarker::Conditional(tree),
        }
    }

    /// Remove the clauses that always hold within `python_versions`, and collapse the marker to
    /// `false` if it can't hold for any of them.
    #[must_use]
    pub fn simplify_python_versions(self, python_versions: Ranges<Version>) -> Self {
        simplify(
            self,
            &MarkerContext::default().with_python_versions(python_versions),
        )
    }

    /// Decide every `extra` expression given the active extras.
    #[must_use]
    pub fn simplify_extras(self, extras: &[ExtraName]) -> Self {
        simplify(self, &MarkerContext::default().with_extras(extras.to_vec()))
    }

    /// The interpreter versions for which the marker may hold. Clauses on other keys are treated
    /// as satisfiable, so the result is an upper bound.
    pub fn python_versions(&self) -> Ranges<Version> {
        match self {
            Self::True => Ranges::full(),
            Self::False => Ranges::empty(),
            Self::Expression(expression) => python_range(expression).unwrap_or_else(Ranges::full),
            Self::And(children) => children
                .iter()
                .fold(Ranges::full(), |range, child| range.intersection(&child.python_versions())),
            Self::Or(children) => children
                .iter()
                .fold(Ranges::empty(), |range, child| range.union(&child.python_versions())),
        }
    }
}

fn simplify(tree: MarkerTree, context: &MarkerContext) -> MarkerTree {
    match tree {
        MarkerTree::True | MarkerTree::False => tree,
        MarkerTree::Expression(expression) => simplify_expression(expression, context),
        MarkerTree::And(children) => {
            let tree = MarkerTree::conjunction(
                children.into_iter().map(|child| simplify(child, context)),
            );
            match tree {
                MarkerTree::And(ref children) if is_contradiction(children, context) => {
                    MarkerTree::False
                }
                tree => tree,
            }
        }
        MarkerTree::Or(children) => {
            let tree = MarkerTree::disjunction(
                children.into_iter().map(|child| simplify(child, context)),
            );
            match tree {
                MarkerTree::Or(ref children) if is_tautology(children, context) => MarkerTree::True,
                tree => tree,
            }
        }
    }
}

fn simplify_expression(expression: MarkerExpression, context: &MarkerContext) -> MarkerTree {
    if let Some(python_versions) = &context.python_versions {
        if let Some(range) = python_range(&expression) {
            let overlap = range.intersection(python_versions);
            if overlap.is_empty() {
                return MarkerTree::False;
            }
            if overlap == *python_versions {
                return MarkerTree::True;
            }
        }
    }

    if let (Some(extras), MarkerExpression::Extra { operator, name }) =
        (&context.extras, &expression)
    {
        let active = name
            .as_extra()
            .is_some_and(|extra| extras.contains(extra));
        let holds = match operator {
            ExtraOperator::Equal => active,
            ExtraOperator::NotEqual => !active,
        };
        return if holds {
            MarkerTree::True
        } else {
            MarkerTree::False
        };
    }

    MarkerTree::Expression(expression)
}

/// The range of full interpreter versions for which a `python_version` or
/// `python_full_version` expression holds.
fn python_range(expression: &MarkerExpression) -> Option<Ranges<Version>> {
    match expression {
        MarkerExpression::Version { key, specifier } if key.is_python() => {
            if *key == MarkerValueVersion::PythonVersion {
                Some(python_version_range(specifier))
            } else {
                Some(Ranges::from(specifier.clone()))
            }
        }
        MarkerExpression::VersionIn {
            key,
            versions,
            negated,
        } if key.is_python() => {
            let range = versions.iter().fold(Ranges::empty(), |range, version| {
                let specifier = VersionSpecifier::equals_version(version.clone());
                let member = if *key == MarkerValueVersion::PythonVersion {
                    python_version_range(&specifier)
                } else {
                    Ranges::from(specifier)
                };
                range.union(&member)
            });
            Some(if *negated { range.complement() } else { range })
        }
        _ => None,
    }
}

/// `python_version` is `major.minor`, so `python_version > '3.8'` means every 3.9 or later
/// interpreter, including pre-releases such as `3.9.0rc1`.
fn python_version_range(specifier: &VersionSpecifier) -> Ranges<Version> {
    let version = specifier.version();
    let is_minor = version.epoch() == 0
        && version.release().len() <= 2
        && version.is_stable()
        && !version.is_post()
        && !version.is_local();
    if !is_minor {
        return Ranges::from(specifier.clone());
    }

    let release = version.release();
    let minor = Version::new([release[0], release.get(1).copied().unwrap_or(0)]);
    let next_minor = minor.bump_release(1);
    // Every full version that sorts below the `minor` series, including its pre-releases.
    let below = |version: Version| Ranges::from(VersionSpecifier::less_than_version(version));

    match specifier.operator() {
        Operator::Equal => below(next_minor).intersection(&below(minor).complement()),
        Operator::NotEqual => below(next_minor)
            .intersection(&below(minor).complement())
            .complement(),
        Operator::LessThan => below(minor),
        Operator::GreaterThanEqual => below(minor).complement(),
        Operator::LessThanEqual => below(next_minor),
        Operator::GreaterThan => below(next_minor).complement(),
        _ => Ranges::from(specifier.clone()),
    }
}

/// Whether the children of an `and` can't all hold at once.
fn is_contradiction(children: &[MarkerTree], context: &MarkerContext) -> bool {
    let mut equal = FxHashMap::default();
    let mut python = None::<Ranges<Version>>;
    for child in children {
        let MarkerTree::Expression(expression) = child else {
            continue;
        };
        match expression {
            MarkerExpression::String {
                key,
                operator: MarkerOperator::Equal,
                value,
            } => {
                if let Some(previous) = equal.insert(key.canonical(), value.as_str()) {
                    if previous != value.as_str() {
                        return true;
                    }
                }
            }
            MarkerExpression::Extra {
                operator: ExtraOperator::Equal,
                name: MarkerValueExtra::Arbitrary(_),
            } => return true,
            _ => {}
        }
        if let Some(range) = python_range(expression) {
            let range = match python.take() {
                Some(python) => python.intersection(&range),
                None => context
                    .python_versions
                    .as_ref()
                    .map_or(range.clone(), |python| python.intersection(&range)),
            };
            if range.is_empty() {
                return true;
            }
            python = Some(range);
        }
    }

    // `key == 'a' and key != 'a'`
    children.iter().any(|child| {
        let MarkerTree::Expression(expression) = child else {
            return false;
        };
        negation(expression).is_some_and(|negated| {
            children
                .iter()
                .any(|other| matches!(other, MarkerTree::Expression(other) if *other == negated))
        })
    }) || children.iter().any(|child| match child {
        MarkerTree::Expression(MarkerExpression::String {
            key,
            operator: MarkerOperator::NotEqual,
            value,
        }) => equal.get(&key.canonical()) == Some(&value.as_str()),
        _ => false,
    })
}

/// Whether at least one of the children of an `or` always holds.
fn is_tautology(children: &[MarkerTree], context: &MarkerContext) -> bool {
    // `key == 'a' or key != 'a'`
    let complementary = children.iter().any(|child| {
        let MarkerTree::Expression(expression) = child else {
            return false;
        };
        negation(expression).is_some_and(|negated| {
            children
                .iter()
                .any(|other| matches!(other, MarkerTree::Expression(other) if *other == negated))
        })
    });
    if complementary {
        return true;
    }

    let mut covered = None::<Ranges<Version>>;
    for child in children {
        if let MarkerTree::Expression(expression) = child {
            if let Some(range) = python_range(expression) {
                covered = Some(match covered {
                    Some(covered) => covered.union(&range),
                    None => range,
                });
            }
        }
    }
    let Some(covered) = covered else {
        return false;
    };
    match &context.python_versions {
        Some(python_versions) => covered.intersection(python_versions) == *python_versions,
        None => covered == Ranges::full(),
    }
}

/// The expression that holds exactly when this one doesn't, for the operators that have one.
fn negation(expression: &MarkerExpression) -> Option<MarkerExpression> {
    match expression {
        MarkerExpression::String {
            key,
            operator,
            value,
        } => {
            let operator = match operator {
                MarkerOperator::Equal => MarkerOperator::NotEqual,
                MarkerOperator::NotEqual => MarkerOperator::Equal,
                MarkerOperator::In => MarkerOperator::NotIn,
                MarkerOperator::NotIn => MarkerOperator::In,
                MarkerOperator::Contains => MarkerOperator::NotContains,
                MarkerOperator::NotContains => MarkerOperator::Contains,
                _ => return None,
            };
            Some(MarkerExpression::String {
                key: *key,
                operator,
                value: value.clone(),
            })
        }
        MarkerExpression::Extra { operator, name } => Some(MarkerExpression::Extra {
            operator: match operator {
                ExtraOperator::Equal => ExtraOperator::NotEqual,
                ExtraOperator::NotEqual => ExtraOperator::Equal,
            },
            name: name.clone(),
        }),
        MarkerExpression::VersionIn {
            key,
            versions,
            negated,
        } => Some(MarkerExpression::VersionIn {
            key: *key,
            versions: versions.clone(),
            negated: !negated,
        }),
        MarkerExpression::Version { .. } => None,
    }
}
