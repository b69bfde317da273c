use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::version::compare_release;
use crate::{Operator, OperatorParseError, Version, VersionParseError};

/// Sorted version specifiers, such as `>=2.1,<3`, combined with logical AND.
///
/// An empty set matches every version.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl std::ops::Deref for VersionSpecifiers {
    type Target = [VersionSpecifier];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl VersionSpecifiers {
    /// Matches all versions.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Whether all specifiers match the given version.
    pub fn contains(&self, version: &Version) -> bool {
        self.iter().all(|specifier| specifier.contains(version))
    }

    /// Whether any specifier mentions a pre-release, which opts the package into pre-releases.
    pub fn any_prerelease(&self) -> bool {
        self.iter().any(VersionSpecifier::any_prerelease)
    }

    /// Sort the specifiers so equivalent sets print identically.
    fn from_unsorted(mut specifiers: Vec<VersionSpecifier>) -> Self {
        specifiers.sort_by(|a, b| {
            a.version()
                .cmp(b.version())
                .then_with(|| a.operator().cmp(b.operator()))
        });
        specifiers.dedup();
        Self(specifiers)
    }
}

impl FromIterator<VersionSpecifier> for VersionSpecifiers {
    fn from_iter<T: IntoIterator<Item = VersionSpecifier>>(iter: T) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

impl IntoIterator for VersionSpecifiers {
    type Item = VersionSpecifier;
    type IntoIter = std::vec::IntoIter<VersionSpecifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionSpecifiersParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_version_specifiers(s).map(Self::from_unsorted)
    }
}

impl From<VersionSpecifier> for VersionSpecifiers {
    fn from(specifier: VersionSpecifier) -> Self {
        Self(vec![specifier])
    }
}

impl Display for VersionSpecifiers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (idx, version_specifier) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{version_specifier}")?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for VersionSpecifiers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for VersionSpecifiers {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Error with span information (unicode width) inside the parsed line.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct VersionSpecifiersParseError {
    inner: Box<VersionSpecifiersParseErrorInner>,
}

#[derive(Debug, Eq, PartialEq, Clone)]
struct VersionSpecifiersParseErrorInner {
    err: VersionSpecifierParseError,
    line: String,
    /// Byte offsets of the failing specifier.
    start: usize,
    end: usize,
}

impl Display for VersionSpecifiersParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use unicode_width::UnicodeWidthStr;

        let VersionSpecifiersParseErrorInner {
            ref err,
            ref line,
            start,
            end,
        } = *self.inner;
        writeln!(f, "Failed to parse version: {err}:")?;
        writeln!(f, "{line}")?;
        let indent = line[..start].width();
        let point = line[start..end].width();
        writeln!(f, "{}{}", " ".repeat(indent), "^".repeat(point))?;
        Ok(())
    }
}

impl VersionSpecifiersParseError {
    /// The string that failed to parse.
    pub fn line(&self) -> &str {
        &self.inner.line
    }
}

impl std::error::Error for VersionSpecifiersParseError {}

/// A single comparison such as `>1.2.3`, `<=4!5.6.7-a8.post9.dev0` or `== 4.1.*`.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct VersionSpecifier {
    pub(crate) operator: Operator,
    pub(crate) version: Version,
}

impl VersionSpecifier {
    /// Build from parts, validating that the operator is allowed with that version. `star`
    /// indicates a trailing `.*`, to differentiate between `1.1.*` and `1.1`.
    pub fn from_pattern(
        operator: Operator,
        version: Version,
        star: bool,
    ) -> Result<Self, VersionSpecifierBuildError> {
        let operator = if star {
            operator
                .to_star()
                .ok_or(BuildErrorKind::OperatorWithStar { operator })?
        } else {
            operator
        };
        Self::from_version(operator, version)
    }

    /// Create a new version specifier from an operator and a version.
    pub fn from_version(
        operator: Operator,
        version: Version,
    ) -> Result<Self, VersionSpecifierBuildError> {
        // "Local version identifiers are NOT permitted in this version specifier."
        if version.is_local() && !operator.is_local_compatible() {
            return Err(BuildErrorKind::OperatorLocalCombo { operator, version }.into());
        }

        if operator == Operator::TildeEqual && version.release().len() < 2 {
            return Err(BuildErrorKind::CompatibleRelease.into());
        }

        Ok(Self { operator, version })
    }

    /// `==<version>`
    pub fn equals_version(version: Version) -> Self {
        Self {
            operator: Operator::Equal,
            version,
        }
    }

    /// `>=<version>`
    pub fn greater_than_equal_version(version: Version) -> Self {
        Self {
            operator: Operator::GreaterThanEqual,
            version,
        }
    }

    /// `<<version>`
    pub fn less_than_version(version: Version) -> Self {
        Self {
            operator: Operator::LessThan,
            version,
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Get the operator and version parts of this specifier.
    pub fn into_parts(self) -> (Operator, Version) {
        (self.operator, self.version)
    }

    /// Whether the specifier names a pre-release.
    pub fn any_prerelease(&self) -> bool {
        self.version.any_prerelease()
    }

    /// Whether the given version satisfies the specifier.
    ///
    /// See:
    /// - <https://peps.python.org/pep-0440/#version-specifiers>
    /// - <https://github.com/pypa/packaging/blob/e184feef1a28a5c574ec41f5c263a3a573861f5a/packaging/specifiers.py#L362-L496>
    pub fn contains(&self, version: &Version) -> bool {
        // "local version labels MUST be ignored entirely when checking if candidate versions
        // match a given version specifier", unless the specifier itself has one.
        let this = &self.version;
        let other = if this.is_local() {
            version.clone()
        } else {
            version.without_local()
        };

        match self.operator {
            Operator::Equal => other == *this,
            Operator::EqualStar => {
                this.epoch() == other.epoch()
                    && this
                        .release()
                        .iter()
                        .zip(other.release().iter().chain(std::iter::repeat(&0)))
                        .all(|(this, other)| this == other)
            }
            Operator::ExactEqual => {
                tracing::warn!("Using arbitrary equality (`===`) is discouraged");
                this.to_string() == version.to_string()
            }
            Operator::NotEqual => other != *this,
            Operator::NotEqualStar => {
                this.epoch() != other.epoch()
                    || !this
                        .release()
                        .iter()
                        .zip(other.release().iter().chain(std::iter::repeat(&0)))
                        .all(|(this, other)| this == other)
            }
            Operator::TildeEqual => {
                // "For a given release identifier V.N, the compatible release clause is
                // approximately equivalent to the pair of comparison clauses: `>= V.N, == V.*`"
                let release = this.release();
                let Some((_, prefix)) = release.split_last() else {
                    return false;
                };
                if this.epoch() != other.epoch() {
                    return false;
                }
                if !prefix
                    .iter()
                    .zip(other.release().iter().chain(std::iter::repeat(&0)))
                    .all(|(this, other)| this == other)
                {
                    return false;
                }
                other >= *this
            }
            Operator::GreaterThan => Self::greater_than(this, &other),
            Operator::GreaterThanEqual => Self::greater_than(this, &other) || other >= *this,
            Operator::LessThan => {
                Self::less_than(this, &other)
                    && !(compare_release(this.release(), other.release()) == Ordering::Equal
                        && other.any_prerelease()
                        && !this.any_prerelease())
            }
            Operator::LessThanEqual => Self::less_than(this, &other) || other <= *this,
        }
    }

    fn less_than(this: &Version, other: &Version) -> bool {
        if other.epoch() < this.epoch() {
            return true;
        }

        // Unless the specifier itself is a pre-release, don't accept pre-releases of the version
        // it mentions: `<3.1` rejects `3.1.dev0` but accepts `3.0.dev0`.
        if !this.any_prerelease()
            && other.is_pre()
            && compare_release(this.release(), other.release()) == Ordering::Equal
        {
            return false;
        }

        other < this
    }

    fn greater_than(this: &Version, other: &Version) -> bool {
        if other.epoch() > this.epoch() {
            return true;
        }

        if compare_release(this.release(), other.release()) == Ordering::Equal {
            // Unless the specifier itself is a post-release, don't accept post-releases of the
            // version it mentions: `>3.1` rejects `3.1.post0` but accepts `3.2.post0`.
            if !this.is_post() && other.is_post() {
                return false;
            }

            if other.is_local() {
                return false;
            }
        }

        other > this
    }
}

impl FromStr for VersionSpecifier {
    type Err = VersionSpecifierParseError;

    /// Parses a specifier such as `>= 1.19`, `== 1.1.*`, `~=1.0+abc.5` or `<=1!2012.2`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut s = unscanny::Scanner::new(spec);
        s.eat_whitespace();
        let operator = s.eat_while(['=', '!', '~', '<', '>']);
        if operator.is_empty() {
            return Err(ParseErrorKind::MissingOperator.into());
        }
        let operator = Operator::from_str(operator).map_err(ParseErrorKind::InvalidOperator)?;
        s.eat_whitespace();
        let version = s.eat_while(|c: char| !c.is_whitespace());
        if version.is_empty() {
            return Err(ParseErrorKind::MissingVersion.into());
        }
        let (version, star) =
            Version::from_str_star(version).map_err(ParseErrorKind::InvalidVersion)?;
        let version_specifier = Self::from_pattern(operator, version, star)
            .map_err(ParseErrorKind::InvalidSpecifier)?;
        s.eat_whitespace();
        if !s.done() {
            return Err(ParseErrorKind::InvalidTrailing(s.after().to_string()).into());
        }
        Ok(version_specifier)
    }
}

impl Display for VersionSpecifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.operator.is_star() {
            return write!(f, "{}{}.*", self.operator, self.version);
        }
        write!(f, "{}{}", self.operator, self.version)
    }
}

/// An error that can occur when constructing a version specifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionSpecifierBuildError {
    kind: Box<BuildErrorKind>,
}

impl std::error::Error for VersionSpecifierBuildError {}

impl Display for VersionSpecifierBuildError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match *self.kind {
            BuildErrorKind::OperatorLocalCombo {
                operator: ref op,
                ref version,
            } => {
                let local = version
                    .local()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<String>>()
                    .join(".");
                write!(
                    f,
                    "Operator {op} is incompatible with versions \
                     containing non-empty local segments (`+{local}`)",
                )
            }
            BuildErrorKind::OperatorWithStar { operator: ref op } => {
                write!(
                    f,
                    "Operator {op} cannot be used with a wildcard version specifier",
                )
            }
            BuildErrorKind::CompatibleRelease => {
                write!(
                    f,
                    "The ~= operator requires at least two segments in the release version"
                )
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum BuildErrorKind {
    OperatorLocalCombo { operator: Operator, version: Version },
    OperatorWithStar { operator: Operator },
    CompatibleRelease,
}

impl From<BuildErrorKind> for VersionSpecifierBuildError {
    fn from(kind: BuildErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
        }
    }
}

/// An error that can occur when parsing a single version specifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionSpecifierParseError {
    kind: Box<ParseErrorKind>,
}

impl std::error::Error for VersionSpecifierParseError {}

impl Display for VersionSpecifierParseError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match *self.kind {
            ParseErrorKind::InvalidOperator(ref err) => err.fmt(f),
            ParseErrorKind::InvalidVersion(ref err) => err.fmt(f),
            ParseErrorKind::InvalidSpecifier(ref err) => err.fmt(f),
            ParseErrorKind::MissingOperator => {
                write!(f, "Unexpected end of version specifier, expected operator")
            }
            ParseErrorKind::MissingVersion => {
                write!(f, "Unexpected end of version specifier, expected version")
            }
            ParseErrorKind::InvalidTrailing(ref trail) => {
                write!(f, "Trailing `{trail}` is not allowed")
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum ParseErrorKind {
    InvalidOperator(OperatorParseError),
    InvalidVersion(VersionParseError),
    InvalidSpecifier(VersionSpecifierBuildError),
    MissingOperator,
    MissingVersion,
    InvalidTrailing(String),
}

impl From<ParseErrorKind> for VersionSpecifierParseError {
    fn from(kind: ParseErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
        }
    }
}

impl From<VersionSpecifierBuildError> for VersionSpecifierParseError {
    fn from(err: VersionSpecifierBuildError) -> Self {
        ParseErrorKind::InvalidSpecifier(err).into()
    }
}

impl From<VersionParseError> for VersionSpecifierParseError {
    fn from(err: VersionParseError) -> Self {
        ParseErrorKind::InvalidVersion(err).into()
    }
}

impl VersionSpecifiersParseError {
    pub(crate) fn new(
        err: VersionSpecifierParseError,
        line: &str,
        start: usize,
        end: usize,
    ) -> Self {
        Self {
            inner: Box::new(VersionSpecifiersParseErrorInner {
                err,
                line: line.to_string(),
                start,
                end,
            }),
        }
    }
}

/// Parse a list of specifiers such as `>= 1.0, != 1.3.*, < 2.0`.
fn parse_version_specifiers(
    spec: &str,
) -> Result<Vec<VersionSpecifier>, VersionSpecifiersParseError> {
    let mut version_ranges = Vec::new();
    if spec.trim().is_empty() {
        return Ok(version_ranges);
    }
    let mut start: usize = 0;
    let separator = ",";
    for version_range_spec in spec.split(separator) {
        match VersionSpecifier::from_str(version_range_spec) {
            Err(err) => {
                return Err(VersionSpecifiersParseError::new(
                    err,
                    spec,
                    start,
                    start + version_range_spec.len(),
                ));
            }
            Ok(version_range) => {
                version_ranges.push(version_range);
            }
        }
        start += version_range_spec.len();
        start += separator.len();
    }
    Ok(version_ranges)
}
