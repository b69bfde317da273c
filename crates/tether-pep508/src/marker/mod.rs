//! PEP 508 markers with validation, warnings and symbolic simplification.
//!
//! Markers allow you to install dependencies only in specific environments (python version,
//! operating system, architecture, etc.) or when a specific feature is activated. E.g. you can
//! say `importlib-metadata ; python_version < "3.8"` or
//! `itsdangerous (>=1.1.0) ; extra == 'security'`. The design of comparisons (PEP 440 comparisons
//! with lexicographic fallback) leads to confusing outcomes, so bogus comparisons are reported
//! through a [`crate::Reporter`] instead of failing. Clauses on keys that aren't PEP 508 keys are
//! dropped, leaving the rest of the marker intact.

mod environment;
pub(crate) mod parse;
mod simplify;
mod tree;

pub use environment::{MarkerEnvironment, MarkerEnvironmentBuilder};
pub use simplify::{MarkerContext, SymbolicMarker};
pub use tree::{
    ExtraOperator, MarkerExpression, MarkerOperator, MarkerTree, MarkerTreeContents, MarkerValue,
    MarkerValueExtra, MarkerValueString, MarkerValueVersion, MarkerWarningKind, StringVersion,
};
