//! Constraint expressions as they appear in project manifests and lock files.
//!
//! On top of PEP 440 specifiers, this accepts the shorthand used by lock files: `*` for any
//! version, a bare version for `==`, caret (`^1.2`) and tilde (`~1.2`) ranges, whitespace as a
//! clause separator, and `||` between alternatives.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use unscanny::Scanner;
use version_ranges::Ranges;

use crate::{
    Operator, Version, VersionParseError, VersionSpecifier, VersionSpecifierBuildError,
    VersionSpecifiers,
};

/// Parse a constraint such as `>=19,<21`, `~=0.6.1`, `^3.7` or `>=2.7,<2.8 || >=3.5`.
pub fn parse_constraint(text: &str) -> Result<VersionConstraint, ConstraintParseError> {
    VersionConstraint::from_str(text)
}

/// A disjunction of conjunctive specifier sets.
///
/// A constraint without `||` has exactly one alternative. A constraint with an empty alternative
/// matches any version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionConstraint {
    alternatives: Vec<VersionSpecifiers>,
}

impl VersionConstraint {
    /// A constraint matching every version.
    pub fn any() -> Self {
        Self {
            alternatives: vec![VersionSpecifiers::empty()],
        }
    }

    /// Returns `true` if the constraint matches every version.
    pub fn is_any(&self) -> bool {
        self.alternatives.iter().any(|specifiers| specifiers.is_empty())
    }

    /// The alternatives, each a set of specifiers that must all hold.
    pub fn alternatives(&self) -> &[VersionSpecifiers] {
        &self.alternatives
    }

    /// Whether the version satisfies at least one alternative.
    pub fn contains(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|specifiers| specifiers.contains(version))
    }

    /// Whether any clause mentions a pre-release.
    pub fn any_prerelease(&self) -> bool {
        self.alternatives
            .iter()
            .any(VersionSpecifiers::any_prerelease)
    }

    /// The set of versions admitted by this constraint.
    pub fn to_ranges(&self) -> Ranges<Version> {
        self.alternatives
            .iter()
            .fold(Ranges::empty(), |acc, specifiers| {
                acc.union(&Ranges::from(specifiers.clone()))
            })
    }
}

impl Default for VersionConstraint {
    fn default() -> Self {
        Self::any()
    }
}

impl From<VersionSpecifiers> for VersionConstraint {
    fn from(specifiers: VersionSpecifiers) -> Self {
        Self {
            alternatives: vec![specifiers],
        }
    }
}

impl From<VersionSpecifier> for VersionConstraint {
    fn from(specifier: VersionSpecifier) -> Self {
        Self::from(VersionSpecifiers::from(specifier))
    }
}

impl FromStr for VersionConstraint {
    type Err = ConstraintParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut alternatives = Vec::new();
        let mut offset = 0;
        for alternative in text.split("||") {
            let specifiers = parse_alternative(alternative).map_err(|(kind, start, end)| {
                ConstraintParseError {
                    inner: Box::new(ConstraintParseErrorInner {
                        kind,
                        line: text.to_string(),
                        start: offset + start,
                        end: offset + end,
                    }),
                }
            })?;
            alternatives.push(specifiers);
            offset += alternative.len() + "||".len();
        }

        // `*` anywhere among the alternatives swallows the rest.
        if alternatives.iter().any(|specifiers| specifiers.is_empty()) {
            return Ok(Self::any());
        }
        alternatives.dedup();
        Ok(Self { alternatives })
    }
}

/// Parse one `||`-free alternative, returning the error kind and its byte span on failure.
fn parse_alternative(
    text: &str,
) -> Result<VersionSpecifiers, (ConstraintErrorKind, usize, usize)> {
    let mut specifiers = Vec::new();
    let mut s = Scanner::new(text);
    loop {
        s.eat_while(|c: char| c.is_whitespace() || c == ',');
        if s.done() {
            break;
        }
        let start = s.cursor();
        let operator = s.eat_while(['=', '!', '~', '<', '>', '^']);
        s.eat_whitespace();
        let version = s.eat_while(|c: char| !c.is_whitespace() && c != ',');
        let end = s.cursor();
        if version.is_empty() {
            return Err((ConstraintErrorKind::MissingVersion, start, end));
        }
        clause(operator, version, &mut specifiers).map_err(|kind| (kind, start, end))?;
    }
    Ok(specifiers.into_iter().collect())
}

/// Expand a single clause into its PEP 440 specifiers.
fn clause(
    operator: &str,
    version: &str,
    specifiers: &mut Vec<VersionSpecifier>,
) -> Result<(), ConstraintErrorKind> {
    if version == "*" {
        return match operator {
            "" | "==" => Ok(()),
            _ => Err(ConstraintErrorKind::InvalidOperator(operator.to_string())),
        };
    }

    match operator {
        "^" => {
            let version = Version::from_str(version)?;
            let upper = caret_upper_bound(&version);
            specifiers.push(VersionSpecifier::greater_than_equal_version(version));
            specifiers.push(VersionSpecifier::less_than_version(upper));
        }
        "~" => {
            let version = Version::from_str(version)?;
            let index = usize::from(version.release().len() > 1);
            let upper = version.bump_release(index);
            specifiers.push(VersionSpecifier::greater_than_equal_version(version));
            specifiers.push(VersionSpecifier::less_than_version(upper));
        }
        operator => {
            let operator = if operator.is_empty() {
                Operator::Equal
            } else {
                Operator::from_str(operator)
                    .map_err(|_| ConstraintErrorKind::InvalidOperator(operator.to_string()))?
            };
            let (version, star) = Version::from_str_star(version)?;
            specifiers.push(VersionSpecifier::from_pattern(operator, version, star)?);
        }
    }
    Ok(())
}

/// The exclusive upper bound of `^version`: bump the first non-zero release segment, or the
/// last given segment if all are zero.
fn caret_upper_bound(version: &Version) -> Version {
    let release = version.release();
    let index = release
        .iter()
        .position(|segment| *segment != 0)
        .unwrap_or(release.len().saturating_sub(1));
    version.bump_release(index)
}

impl Display for VersionConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_any() {
            return f.write_str("*");
        }
        for (index, specifiers) in self.alternatives.iter().enumerate() {
            if index > 0 {
                f.write_str(" || ")?;
            }
            write!(f, "{specifiers}")?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for VersionConstraint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for VersionConstraint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A malformed constraint, with the span of the failing clause.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConstraintParseError {
    inner: Box<ConstraintParseErrorInner>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct ConstraintParseErrorInner {
    kind: ConstraintErrorKind,
    line: String,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
enum ConstraintErrorKind {
    #[error("Expected a version after the operator")]
    MissingVersion,
    #[error("Unknown operator `{0}`")]
    InvalidOperator(String),
    #[error(transparent)]
    InvalidVersion(#[from] VersionParseError),
    #[error(transparent)]
    InvalidSpecifier(#[from] VersionSpecifierBuildError),
}

impl ConstraintParseError {
    /// The constraint that failed to parse.
    pub fn line(&self) -> &str {
        &self.inner.line
    }

    /// Why the failing clause was rejected, without the underline.
    pub fn reason(&self) -> String {
        self.inner.kind.to_string()
    }

    /// The byte span of the failing clause within [`Self::line`].
    pub fn span(&self) -> std::ops::Range<usize> {
        self.inner.start..self.inner.end
    }
}

impl Display for ConstraintParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use unicode_width::UnicodeWidthStr;

        let ConstraintParseErrorInner {
            ref kind,
            ref line,
            start,
            end,
        } = *self.inner;
        writeln!(f, "Failed to parse version constraint: {kind}:")?;
        writeln!(f, "{line}")?;
        let indent = line[..start].width();
        let point = line[start..end].width().max(1);
        write!(f, "{}{}", " ".repeat(indent), "^".repeat(point))
    }
}

impl std::error::Error for ConstraintParseError {}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indoc::indoc;
    use test_case::test_case;

    use super::*;

    fn version(version: &str) -> Version {
        Version::from_str(version).unwrap()
    }

    #[test_case("*", "*")]
    #[test_case("", "*")]
    #[test_case("1.2.3", "==1.2.3")]
    #[test_case("==1.2.3", "==1.2.3")]
    #[test_case("^1.2.3", ">=1.2.3,<2.0.0")]
    #[test_case("^0.2.3", ">=0.2.3,<0.3.0")]
    #[test_case("^0.0.3", ">=0.0.3,<0.0.4")]
    #[test_case("^0", ">=0,<1")]
    #[test_case("^3.7", ">=3.7,<4.0")]
    #[test_case("~1.2.3", ">=1.2.3,<1.3.0")]
    #[test_case("~1", ">=1,<2")]
    #[test_case("~=0.6.1", "~=0.6.1")]
    #[test_case("1.2.*", "==1.2.*")]
    #[test_case(">=19, <21", ">=19,<21")]
    #[test_case(">= 19 < 21", ">=19,<21")]
    #[test_case(">=2.7,<2.8 || >=3.5", ">=2.7,<2.8 || >=3.5")]
    #[test_case(">=3.6 || *", "*")]
    fn canonical(input: &str, expected: &str) {
        assert_eq!(parse_constraint(input).unwrap().to_string(), expected);
    }

    #[test]
    fn wildcard_equivalence() {
        let wildcard = parse_constraint("1.2.*").unwrap();
        let explicit = parse_constraint(">=1.2.0,<1.3.0").unwrap();
        for candidate in ["1.1.9", "1.2.0", "1.2.7", "1.2.99", "1.3.0", "2.0"] {
            assert_eq!(
                wildcard.contains(&version(candidate)),
                explicit.contains(&version(candidate)),
                "{candidate}"
            );
        }
    }

    #[test]
    fn compatible_release_equivalence() {
        let compatible = parse_constraint("~=1.4.2").unwrap();
        let explicit = parse_constraint(">=1.4.2,<1.5.0").unwrap();
        for candidate in ["1.4.1", "1.4.2", "1.4.9", "1.5.0", "1.5.1"] {
            assert_eq!(
                compatible.contains(&version(candidate)),
                explicit.contains(&version(candidate)),
                "{candidate}"
            );
        }
    }

    #[test]
    fn disjunction() {
        let constraint = parse_constraint(">=2.7,<2.8 || >=3.5").unwrap();
        assert!(constraint.contains(&version("2.7.18")));
        assert!(!constraint.contains(&version("3.4")));
        assert!(constraint.contains(&version("3.11")));
        assert!(!constraint.is_any());

        let ranges = constraint.to_ranges();
        assert!(ranges.contains(&version("2.7.18")));
        assert!(!ranges.contains(&version("3.0")));
        assert!(ranges.contains(&version("3.11")));
    }

    #[test]
    fn any() {
        let constraint = parse_constraint("*").unwrap();
        assert!(constraint.is_any());
        assert!(constraint.contains(&version("0.0.1")));
        assert_eq!(constraint.to_ranges(), Ranges::full());
    }

    #[test]
    fn canonical_forms_are_equal() {
        assert_eq!(
            parse_constraint("<21, >=19").unwrap(),
            parse_constraint(">=19 <21").unwrap()
        );
        assert_ne!(
            parse_constraint(">=19,<21").unwrap(),
            parse_constraint(">=19,<22").unwrap()
        );
    }

    #[test]
    fn errors() {
        let err = parse_constraint(">=1.0, <2.0.x").unwrap_err();
        assert_eq!(
            err.to_string(),
            indoc! {"
                Failed to parse version constraint: Version `2.0.x` doesn't match PEP 440 rules:
                >=1.0, <2.0.x
                       ^^^^^^"}
        );

        let err = parse_constraint(">=3.6 || <=").unwrap_err();
        assert_eq!(
            err.to_string(),
            indoc! {"
                Failed to parse version constraint: Expected a version after the operator:
                >=3.6 || <=
                         ^^"}
        );

        assert!(parse_constraint("=>1.0").is_err());
        assert!(parse_constraint("^1.*").is_err());
        assert!(parse_constraint(">=*").is_err());
    }
}
