//! PEP 440 versions and version specifiers, plus the constraint syntax used by lock files.
//!
//! ```text
//! 1!2.3.4a5.post6.dev7+local.8
//! ```
//!
//! Versions are totally ordered (`1.0.dev0 < 1.0a1 < 1.0 < 1.0.post1`), specifiers such as
//! `>=1.16, <2.0` test versions with the PEP 440 exclusive-bound rules, and
//! [`VersionConstraint`] adds `*`, `^`, `~` and `||` on top.

pub use crate::constraint::{ConstraintParseError, VersionConstraint, parse_constraint};
pub use crate::version::{
    LocalSegment, Operator, OperatorParseError, Prerelease, PrereleaseKind, Version,
    VersionParseError, parse_version,
};
pub use crate::version_specifier::{
    VersionSpecifier, VersionSpecifierBuildError, VersionSpecifierParseError, VersionSpecifiers,
    VersionSpecifiersParseError,
};

mod constraint;
mod version;
mod version_ranges;
mod version_specifier;
