use std::cmp::{Ordering, max};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::iter;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// The PEP 440 appendix B regex, extended with a trailing `.*` so the same pattern serves
/// wildcard specifiers.
///
/// See: <https://peps.python.org/pep-0440/#appendix-b-parsing-version-strings-with-regular-expressions>
const VERSION_RE_INNER: &str = r"
(?:
    (?:v?)                                            # <https://peps.python.org/pep-0440/#preceding-v-character>
    (?:(?P<epoch>[0-9]+)!)?                           # epoch
    (?P<release>[0-9]+(?:\.[0-9]+)*)                  # release segment
    (?P<pre_field>                                    # pre-release
        [-_\.]?
        (?P<pre_name>(a|b|c|rc|alpha|beta|pre|preview))
        [-_\.]?
        (?P<pre>[0-9]+)?
    )?
    (?P<post_field>                                   # post release
        (?:-(?P<post_old>[0-9]+))
        |
        (?:
            [-_\.]?
            (?P<post_l>post|rev|r)
            [-_\.]?
            (?P<post_new>[0-9]+)?
        )
    )?
    (?P<dev_field>                                    # dev release
        [-_\.]?
        (?P<dev_l>dev)
        [-_\.]?
        (?P<dev>[0-9]+)?
    )?
)
(?:\+(?P<local>[a-z0-9]+(?:[-_\.][a-z0-9]+)*))?       # local version
(?P<trailing_dot_star>\.\*)?                          # wildcard suffix for `==1.2.*`
";

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?xi)^(?:\s*){VERSION_RE_INNER}(?:\s*)$"))
        .expect("the version regex is valid")
});

/// Parse a PEP 440 version such as `1.19`, `1.0a1`, `1.0+abc.5` or `1!2012.2`.
pub fn parse_version(text: &str) -> Result<Version, VersionParseError> {
    Version::from_str(text)
}

/// One of `~=` `==` `!=` `<=` `>=` `<` `>` `===`, plus the wildcard forms of `==` and `!=`.
#[derive(Eq, PartialEq, Debug, Hash, Clone, Copy, Ord, PartialOrd)]
pub enum Operator {
    /// `== 1.2.3`
    Equal,
    /// `== 1.2.*`
    EqualStar,
    /// `===` (discouraged)
    ///
    /// <https://peps.python.org/pep-0440/#arbitrary-equality>
    ExactEqual,
    /// `!= 1.2.3`
    NotEqual,
    /// `!= 1.2.*`
    NotEqualStar,
    /// `~=`
    TildeEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
}

impl Operator {
    /// Returns the wildcard variant of this operator, if one exists.
    pub fn to_star(self) -> Option<Self> {
        match self {
            Self::Equal => Some(Self::EqualStar),
            Self::NotEqual => Some(Self::NotEqualStar),
            _ => None,
        }
    }

    /// Returns `true` if the operator may be combined with a local version.
    pub fn is_local_compatible(self) -> bool {
        !matches!(
            self,
            Self::GreaterThan
                | Self::GreaterThanEqual
                | Self::LessThan
                | Self::LessThanEqual
                | Self::TildeEqual
                | Self::EqualStar
                | Self::NotEqualStar
        )
    }

    /// Returns `true` if the operator is a wildcard operator.
    pub fn is_star(self) -> bool {
        matches!(self, Self::EqualStar | Self::NotEqualStar)
    }
}

impl FromStr for Operator {
    type Err = OperatorParseError;

    /// Parses the base operator; wildcard handling happens once the version is known.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let operator = match s {
            "==" => Self::Equal,
            "===" => {
                tracing::warn!("Using arbitrary equality (`===`) is discouraged");
                Self::ExactEqual
            }
            "!=" => Self::NotEqual,
            "~=" => Self::TildeEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessThanEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterThanEqual,
            other => {
                return Err(OperatorParseError {
                    got: other.to_string(),
                });
            }
        };
        Ok(operator)
    }
}

impl Display for Operator {
    /// Note that the wildcard operators print without their `.*`, which belongs to the version.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let operator = match self {
            Self::Equal | Self::EqualStar => "==",
            Self::ExactEqual => "===",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::TildeEqual => "~=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
        };
        f.write_str(operator)
    }
}

/// An unknown comparison operator.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("No such comparison operator `{got}`, must be one of ~= == != <= >= < > ===")]
pub struct OperatorParseError {
    pub(crate) got: String,
}

/// The kind of a pre-release: alpha, beta or release candidate.
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy, Ord, PartialOrd)]
pub enum PrereleaseKind {
    Alpha,
    Beta,
    Rc,
}

impl Display for PrereleaseKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alpha => f.write_str("a"),
            Self::Beta => f.write_str("b"),
            Self::Rc => f.write_str("rc"),
        }
    }
}

/// A pre-release marker such as `a1` or `rc2`.
///
/// <https://peps.python.org/pep-0440/#pre-releases>
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy, Ord, PartialOrd)]
pub struct Prerelease {
    pub kind: PrereleaseKind,
    pub number: u64,
}

impl Display for Prerelease {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind, self.number)
    }
}

/// A segment of a [local version identifier](https://peps.python.org/pep-0440/#local-version-identifiers).
///
/// Numeric segments compare greater than alphanumeric ones; within a kind, segments compare
/// naturally. With that, the derived ordering of `[LocalSegment]` matches PEP 440.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum LocalSegment {
    String(String),
    Number(u64),
}

impl Display for LocalSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(string) => write!(f, "{string}"),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(n1), Self::Number(n2)) => n1.cmp(n2),
            (Self::String(s1), Self::String(s2)) => s1.cmp(s2),
            (Self::Number(_), Self::String(_)) => Ordering::Greater,
            (Self::String(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

impl From<&str> for LocalSegment {
    fn from(segment: &str) -> Self {
        if let Ok(number) = segment.parse::<u64>() {
            Self::Number(number)
        } else {
            Self::String(segment.to_lowercase())
        }
    }
}

/// The local part of a version, or a value greater than every local part.
///
/// The `Max` variant only exists to express "this release with any local label" as a range
/// bound and is never produced by parsing.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
enum LocalVersion {
    Segments(Vec<LocalSegment>),
    Max,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
enum LocalVersionSlice<'a> {
    Segments(&'a [LocalSegment]),
    Max,
}

impl LocalVersion {
    fn as_slice(&self) -> LocalVersionSlice<'_> {
        match self {
            Self::Segments(segments) => LocalVersionSlice::Segments(segments),
            Self::Max => LocalVersionSlice::Max,
        }
    }
}

impl PartialOrd for LocalVersionSlice<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalVersionSlice<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Segments(lhs), Self::Segments(rhs)) => lhs.cmp(rhs),
            (Self::Segments(_), Self::Max) => Ordering::Less,
            (Self::Max, Self::Segments(_)) => Ordering::Greater,
            (Self::Max, Self::Max) => Ordering::Equal,
        }
    }
}

/// Range-arithmetic markers that place a version below or above every real version sharing its
/// release.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
enum Sentinel {
    Min,
    Max,
}

/// A version number such as `1.2.3` or `4!5.6.7-a8.post9.dev0`.
///
/// The ordering implemented here is the PEP 440 total order. Note that it's not the same as
/// the specifier semantics: `>1.0` rejects `1.0.post1` even though `1.0.post1 > 1.0`.
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<Prerelease>,
    post: Option<u64>,
    dev: Option<u64>,
    local: LocalVersion,
    sentinel: Option<Sentinel>,
}

impl Version {
    /// Create a final release version such as `3.8` from its release segments.
    pub fn new<I, R>(release: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: std::borrow::Borrow<u64>,
    {
        Self {
            epoch: 0,
            release: release.into_iter().map(|segment| *segment.borrow()).collect(),
            pre: None,
            post: None,
            dev: None,
            local: LocalVersion::Segments(Vec::new()),
            sentinel: None,
        }
    }

    /// Like [`Version::from_str`], but also accepts a trailing `.*` and reports whether it was
    /// present.
    ///
    /// * `1.2.3` -> false
    /// * `1.2.3.*` -> true
    /// * `1.2.*.4` -> err
    /// * `1.0-dev1.*` -> err
    pub fn from_str_star(version: &str) -> Result<(Self, bool), VersionParseError> {
        let captures = VERSION_RE
            .captures(version)
            .ok_or_else(|| VersionParseError::NoMatch(version.to_string()))?;
        Self::parse_impl(&captures)
    }

    fn parse_impl(captures: &Captures) -> Result<(Self, bool), VersionParseError> {
        let number_field = |field_name| -> Result<Option<u64>, VersionParseError> {
            captures
                .name(field_name)
                .map(|field| {
                    field
                        .as_str()
                        .parse::<u64>()
                        .map_err(|_| VersionParseError::NumberTooBig(field.as_str().to_string()))
                })
                .transpose()
        };

        // "If no explicit epoch is given, the implicit epoch is 0"
        let epoch = number_field("epoch")?.unwrap_or_default();
        let pre = captures
            .name("pre_name")
            .map(|name| {
                let kind = match name.as_str().to_lowercase().as_str() {
                    "a" | "alpha" => PrereleaseKind::Alpha,
                    "b" | "beta" => PrereleaseKind::Beta,
                    _ => PrereleaseKind::Rc,
                };
                Ok::<_, VersionParseError>(Prerelease {
                    kind,
                    number: number_field("pre")?.unwrap_or_default(),
                })
            })
            .transpose()?;
        let post = if captures.name("post_field").is_some() {
            Some(
                number_field("post_new")?
                    .or(number_field("post_old")?)
                    .unwrap_or_default(),
            )
        } else {
            None
        };
        let dev = if captures.name("dev_field").is_some() {
            Some(number_field("dev")?.unwrap_or_default())
        } else {
            None
        };
        let local: Vec<LocalSegment> = captures
            .name("local")
            .map(|local| {
                local
                    .as_str()
                    .split(['-', '_', '.'])
                    .map(LocalSegment::from)
                    .collect()
            })
            .unwrap_or_default();
        let release = captures
            .name("release")
            .map(|release| release.as_str())
            .unwrap_or_default()
            .split('.')
            .map(|segment| {
                segment
                    .parse::<u64>()
                    .map_err(|_| VersionParseError::NumberTooBig(segment.to_string()))
            })
            .collect::<Result<Vec<u64>, _>>()?;

        let star = captures.name("trailing_dot_star").is_some();
        if star {
            if pre.is_some() {
                return Err(VersionParseError::WildcardSuffix("pre-release"));
            }
            if post.is_some() {
                return Err(VersionParseError::WildcardSuffix("post"));
            }
            if dev.is_some() {
                return Err(VersionParseError::WildcardSuffix("dev"));
            }
            if !local.is_empty() {
                return Err(VersionParseError::WildcardSuffix("local"));
            }
        }

        let version = Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local: LocalVersion::Segments(local),
            sentinel: None,
        };
        Ok((version, star))
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The release segments, e.g. `[1, 2, 3]` for `1.2.3rc1`.
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn pre(&self) -> Option<Prerelease> {
        self.pre
    }

    pub fn post(&self) -> Option<u64> {
        self.post
    }

    pub fn dev(&self) -> Option<u64> {
        self.dev
    }

    /// The local version segments, empty if there are none.
    pub fn local(&self) -> &[LocalSegment] {
        match &self.local {
            LocalVersion::Segments(segments) => segments,
            LocalVersion::Max => &[],
        }
    }

    /// Whether this is an alpha/beta/rc or dev version.
    pub fn any_prerelease(&self) -> bool {
        self.is_pre() || self.is_dev()
    }

    /// Whether this is neither a pre-release nor a dev release.
    pub fn is_stable(&self) -> bool {
        !self.any_prerelease()
    }

    pub fn is_pre(&self) -> bool {
        self.pre.is_some()
    }

    pub fn is_dev(&self) -> bool {
        self.dev.is_some()
    }

    pub fn is_post(&self) -> bool {
        self.post.is_some()
    }

    /// Whether this is a local version (e.g. `1.2.3+deadbeef`).
    pub fn is_local(&self) -> bool {
        !self.local().is_empty()
    }

    #[must_use]
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    #[must_use]
    pub fn with_release(mut self, release: Vec<u64>) -> Self {
        self.release = release;
        self
    }

    #[must_use]
    pub fn with_pre(mut self, pre: Option<Prerelease>) -> Self {
        self.pre = pre;
        self
    }

    #[must_use]
    pub fn with_post(mut self, post: Option<u64>) -> Self {
        self.post = post;
        self
    }

    #[must_use]
    pub fn with_dev(mut self, dev: Option<u64>) -> Self {
        self.dev = dev;
        self
    }

    #[must_use]
    pub fn with_local(mut self, local: Vec<LocalSegment>) -> Self {
        self.local = LocalVersion::Segments(local);
        self
    }

    /// The same public version without its local label.
    #[must_use]
    pub fn without_local(&self) -> Self {
        Self {
            local: LocalVersion::Segments(Vec::new()),
            ..self.clone()
        }
    }

    /// Only the epoch and release segments, e.g. `3.12` for `3.12.0rc1+local`.
    #[must_use]
    pub fn only_release(&self) -> Self {
        Self::new(&self.release).with_epoch(self.epoch)
    }

    /// The greatest version with this public version and any local label.
    #[must_use]
    pub(crate) fn with_local_max(mut self) -> Self {
        self.local = LocalVersion::Max;
        self
    }

    /// A version sorting below every real version with this release, including dev releases.
    #[must_use]
    pub(crate) fn with_min(mut self) -> Self {
        self.sentinel = Some(Sentinel::Min);
        self
    }

    /// A version sorting above every post release of this version.
    #[must_use]
    pub(crate) fn with_max(mut self) -> Self {
        self.sentinel = Some(Sentinel::Max);
        self
    }

    /// Increment the release segment at `index` and drop everything after it, padding with
    /// zeros to the original length: `bump(1.2.3, 0) == 2.0.0`, `bump(1.2.3, 1) == 1.3.0`.
    #[must_use]
    pub fn bump_release(&self, index: usize) -> Self {
        let release: Vec<u64> = self
            .release
            .iter()
            .enumerate()
            .map(|(position, segment)| match position.cmp(&index) {
                Ordering::Less => *segment,
                Ordering::Equal => segment + 1,
                Ordering::Greater => 0,
            })
            .collect();
        Self::new(release).with_epoch(self.epoch)
    }

    /// The ordering key for versions with an equal epoch and release.
    ///
    /// Pre/post/dev ordering is `.devN, aN, bN, rcN, <final>, .postN`, and dev releases of a
    /// pre or post release sort before it. The `min` and `max` sentinels extend the order at both
    /// ends.
    fn sortable_tuple(&self) -> (u64, u64, Option<u64>, u64, LocalVersionSlice<'_>) {
        let local = self.local.as_slice();
        let post = if self.sentinel == Some(Sentinel::Max) {
            Some(u64::MAX)
        } else {
            self.post
        };
        match (self.pre, post, self.dev, self.sentinel) {
            (_, post, _, Some(Sentinel::Min)) => (0, 0, post, 0, local),
            (None, None, Some(n), _) => (1, 0, None, n, local),
            (
                Some(Prerelease {
                    kind: PrereleaseKind::Alpha,
                    number,
                }),
                post,
                dev,
                _,
            ) => (2, number, post, dev.unwrap_or(u64::MAX), local),
            (
                Some(Prerelease {
                    kind: PrereleaseKind::Beta,
                    number,
                }),
                post,
                dev,
                _,
            ) => (3, number, post, dev.unwrap_or(u64::MAX), local),
            (
                Some(Prerelease {
                    kind: PrereleaseKind::Rc,
                    number,
                }),
                post,
                dev,
                _,
            ) => (4, number, post, dev.unwrap_or(u64::MAX), local),
            (None, None, None, _) => (5, 0, None, 0, local),
            (None, Some(post), dev, _) => (6, 0, Some(post), dev.unwrap_or(u64::MAX), local),
        }
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parses a version such as `1.19`, `1.0a1`, `1.0+abc.5` or `1!2012.2`.
    ///
    /// Wildcards are rejected here; see [`Version::from_str_star`].
    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let (parsed, star) = Self::from_str_star(version)?;
        if star {
            return Err(VersionParseError::UnexpectedWildcard(version.to_string()));
        }
        Ok(parsed)
    }
}

/// Shows the normalized version.
impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        for (index, segment) in self.release.iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        if let Some(pre) = self.pre {
            write!(f, "{pre}")?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        if let LocalVersion::Segments(segments) = &self.local {
            for (index, segment) in segments.iter().enumerate() {
                f.write_str(if index == 0 { "+" } else { "." })?;
                write!(f, "{segment}")?;
            }
        }
        Ok(())
    }
}

impl PartialEq<Self> for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    /// Hashes exactly what [`Ord`] compares; trailing zeros are skipped since `1.0 == 1.0.0`.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        let significant = self
            .release
            .iter()
            .rposition(|segment| *segment != 0)
            .map_or(0, |position| position + 1);
        self.release[..significant].hash(state);
        self.sortable_tuple().hash(state);
    }
}

impl PartialOrd<Self> for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    /// 1.0.dev456 < 1.0a1 < 1.0a2.dev456 < 1.0a12.dev456 < 1.0a12 < 1.0b1.dev456 < 1.0b2
    /// < 1.0b2.post345.dev456 < 1.0b2.post345 < 1.0b2-346 < 1.0c1.dev456 < 1.0c1 < 1.0rc2 < 1.0c3
    /// < 1.0 < 1.0.post456.dev34 < 1.0.post456
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| self.sortable_tuple().cmp(&other.sortable_tuple()))
    }
}

/// Compare release segments, padding the shorter one with zeros: `4.3.1 > 4.2`,
/// `1.1.0 == 1.1`, `1.16 < 1.19`.
pub(crate) fn compare_release(this: &[u64], other: &[u64]) -> Ordering {
    let len = max(this.len(), other.len());
    let this = this.iter().chain(iter::repeat(&0)).take(len);
    let other = other.iter().chain(iter::repeat(&0)).take(len);
    this.cmp(other)
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A version string that doesn't follow PEP 440.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Version `{0}` doesn't match PEP 440 rules")]
    NoMatch(String),
    #[error("A wildcard (`.*`) must not be used in a fixed version: `{0}`")]
    UnexpectedWildcard(String),
    #[error("You can't have both a trailing `.*` and a {0} version")]
    WildcardSuffix(&'static str),
    #[error("Version segment `{0}` doesn't fit into an unsigned 64-bit integer")]
    NumberTooBig(String),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    /// <https://github.com/pypa/packaging/blob/237ff3aa348486cf835a980592af3a59fccd6101/tests/test_version.py#L24-L81>
    const SORTED: &[&str] = &[
        "1.0.dev456",
        "1.0a1",
        "1.0a2.dev456",
        "1.0a12.dev456",
        "1.0a12",
        "1.0b1.dev456",
        "1.0b2",
        "1.0b2.post345.dev456",
        "1.0b2.post345",
        "1.0b2-346",
        "1.0c1.dev456",
        "1.0c1",
        "1.0rc2",
        "1.0c3",
        "1.0",
        "1.0.post456.dev34",
        "1.0.post456",
        "1.1.dev1",
        "1.2+123abc",
        "1.2+123abc456",
        "1.2+abc",
        "1.2+abc123",
        "1.2+abc123def",
        "1.2+1234.abc",
        "1.2+123456",
        "1.2.r32+123456",
        "1.2.rev33+123456",
        "1!1.0.dev456",
        "1!1.0a1",
        "1!1.0",
        "1!1.2.rev33+123456",
    ];

    #[test]
    fn ordering() {
        let versions: Vec<Version> = SORTED
            .iter()
            .map(|version| Version::from_str(version).unwrap())
            .collect();
        for (i, a) in versions.iter().enumerate() {
            for (j, b) in versions.iter().enumerate() {
                assert_eq!(a.cmp(b), i.cmp(&j), "{a} vs. {b}");
            }
        }
    }

    #[test]
    fn release_ordering() {
        let parse = |version: &str| Version::from_str(version).unwrap();
        assert!(parse("2.0") > parse("1.9.9"));
        assert!(parse("1.0a1") < parse("1.0"));
        assert!(parse("1.0") < parse("1.0.post1"));
        assert_eq!(parse("1.0"), parse("1.0.0"));
        assert!(parse("1.10") > parse("1.9"));
    }

    #[test]
    fn sentinels() {
        let version = Version::new([1, 0]);
        let dev = Version::from_str("1.0.dev0").unwrap();
        let post = Version::from_str("1.0.post99").unwrap();
        let local = Version::from_str("1.0+ubuntu.1").unwrap();

        assert!(version.clone().with_min() < dev);
        assert!(version.clone().with_min() > Version::from_str("0.9.post9").unwrap());
        assert!(version.clone().with_max() > post);
        assert!(version.clone().with_max() < Version::from_str("1.0.1.dev0").unwrap());
        assert!(version.clone().with_local_max() > local);
        assert!(version.with_local_max() < post);
    }

    #[test]
    fn hash_ignores_trailing_zeros() {
        use std::collections::HashSet;

        let set: HashSet<Version> = ["1.0", "1.0.0", "1", "1.0.0.0"]
            .into_iter()
            .map(|version| Version::from_str(version).unwrap())
            .collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn normalization() {
        let versions = [
            ("1.0dev", "1.0.dev0"),
            ("1.0-dev1", "1.0.dev1"),
            ("1.0DEV", "1.0.dev0"),
            ("1.0a", "1.0a0"),
            ("1.0.alpha1", "1.0a1"),
            ("1.0-B1", "1.0b1"),
            ("1.0c", "1.0rc0"),
            ("1.0.preview2", "1.0rc2"),
            ("1.0post", "1.0.post0"),
            ("1.0r", "1.0.post0"),
            ("1.0.rev1", "1.0.post1"),
            ("1.0-5", "1.0.post5"),
            ("1.0+AbC", "1.0+abc"),
            ("1.0+ubuntu-1", "1.0+ubuntu.1"),
            ("1.01", "1.1"),
            ("1.0a05", "1.0a5"),
            ("1.0c056", "1.0rc56"),
            ("1.1.dev09000", "1.1.dev9000"),
            ("00!1.2", "1.2"),
            ("0100!0.0", "100!0.0"),
            ("v1.0", "1.0"),
            ("   v1.0\t\n", "1.0"),
        ];
        for (version, normalized) in versions {
            assert_eq!(
                Version::from_str(version).unwrap().to_string(),
                normalized,
                "{version}"
            );
        }
    }

    #[test]
    fn failures() {
        let versions = [
            "french toast",
            "",
            "1.0+a+",
            "1.0++",
            "1.0+_foobar",
            "1.0+foo&asd",
            "1.0+1+1",
        ];
        for version in versions {
            assert_eq!(
                parse_version(version).unwrap_err(),
                VersionParseError::NoMatch(version.to_string())
            );
        }
    }

    #[test]
    fn star() {
        assert!(!Version::from_str_star("1.2.3").unwrap().1);
        assert!(Version::from_str_star("1.2.3.*").unwrap().1);
        assert_eq!(
            Version::from_str_star("1.2.*.4.*").unwrap_err(),
            VersionParseError::NoMatch("1.2.*.4.*".to_string())
        );
        assert_eq!(
            Version::from_str_star("1.0-dev1.*").unwrap_err().to_string(),
            "You can't have both a trailing `.*` and a dev version"
        );
        assert_eq!(
            Version::from_str_star("1.0a1.*").unwrap_err().to_string(),
            "You can't have both a trailing `.*` and a pre-release version"
        );
        assert_eq!(
            Version::from_str("0.9.1.*").unwrap_err(),
            VersionParseError::UnexpectedWildcard("0.9.1.*".to_string())
        );
    }

    #[test]
    fn bump() {
        let version = Version::from_str("1.2.3").unwrap();
        assert_eq!(version.bump_release(0).to_string(), "2.0.0");
        assert_eq!(version.bump_release(1).to_string(), "1.3.0");
        assert_eq!(version.bump_release(2).to_string(), "1.2.4");
    }
}
