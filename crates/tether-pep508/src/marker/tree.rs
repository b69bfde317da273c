use std::fmt::{self, Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use tether_normalize::ExtraName;
use tether_pep440::{Operator, Version, VersionParseError, VersionSpecifier};

use crate::marker::parse;
use crate::{MarkerEnvironment, Pep508Error, Reporter, TracingReporter};

/// Ways in which marker parsing or evaluation can go wrong without failing outright.
#[derive(Debug, Eq, Hash, Ord, PartialOrd, PartialEq, Clone, Copy)]
pub enum MarkerWarningKind {
    /// Using an old name from PEP 345 instead of the modern equivalent
    /// <https://peps.python.org/pep-0345/#environment-markers>
    DeprecatedMarkerName,
    /// Doing an operation other than `==` and `!=` on a quoted string with `extra`, such as
    /// `extra > "perf"` or `extra == os_name`
    ExtraInvalidComparison,
    /// Comparing a string valued marker and a string lexicographically, such as `"3.9" > "3.10"`
    LexicographicComparison,
    /// Comparing two markers, such as `os_name != sys_implementation`
    MarkerMarkerComparison,
    /// Failed to parse a PEP 440 version or version specifier, e.g. `>=1<2`
    Pep440Error,
    /// Comparing two strings, such as `"3.9" > "3.10"`
    StringStringComparison,
    /// A key that isn't one of the PEP 508 environment markers, such as `platform_tag`
    UnknownMarkerName,
}

/// Those environment markers with a PEP 440 version as value such as `python_version`
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum MarkerValueVersion {
    /// `implementation_version`
    ImplementationVersion,
    /// `python_full_version`
    PythonFullVersion,
    /// `python_version`
    PythonVersion,
}

impl MarkerValueVersion {
    /// Whether the key describes the interpreter version, which the resolver bounds with the
    /// project's `python-versions`.
    pub fn is_python(self) -> bool {
        matches!(self, Self::PythonFullVersion | Self::PythonVersion)
    }
}

impl Display for MarkerValueVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImplementationVersion => f.write_str("implementation_version"),
            Self::PythonFullVersion => f.write_str("python_full_version"),
            Self::PythonVersion => f.write_str("python_version"),
        }
    }
}

/// Those environment markers with an arbitrary string as value such as `sys_platform`
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum MarkerValueString {
    /// `implementation_name`
    ImplementationName,
    /// `os_name`
    OsName,
    /// Deprecated `os.name` from <https://peps.python.org/pep-0345/#environment-markers>
    OsNameDeprecated,
    /// `platform_machine`
    PlatformMachine,
    /// Deprecated `platform.machine` from <https://peps.python.org/pep-0345/#environment-markers>
    PlatformMachineDeprecated,
    /// `platform_python_implementation`
    PlatformPythonImplementation,
    /// Deprecated `platform.python_implementation` from
    /// <https://peps.python.org/pep-0345/#environment-markers>
    PlatformPythonImplementationDeprecated,
    /// Deprecated `python_implementation` from
    /// <https://github.com/pypa/packaging/issues/72>
    PythonImplementationDeprecated,
    /// `platform_release`
    PlatformRelease,
    /// `platform_system`
    PlatformSystem,
    /// `platform_version`
    PlatformVersion,
    /// Deprecated `platform.version` from <https://peps.python.org/pep-0345/#environment-markers>
    PlatformVersionDeprecated,
    /// `sys_platform`
    SysPlatform,
    /// Deprecated `sys.platform` from <https://peps.python.org/pep-0345/#environment-markers>
    SysPlatformDeprecated,
}

impl MarkerValueString {
    /// The modern spelling of this key.
    pub fn canonical(self) -> Self {
        match self {
            Self::OsNameDeprecated => Self::OsName,
            Self::PlatformMachineDeprecated => Self::PlatformMachine,
            Self::PlatformPythonImplementationDeprecated | Self::PythonImplementationDeprecated => {
                Self::PlatformPythonImplementation
            }
            Self::PlatformVersionDeprecated => Self::PlatformVersion,
            Self::SysPlatformDeprecated => Self::SysPlatform,
            other => other,
        }
    }

    /// Whether this is a PEP 345 spelling.
    pub fn is_deprecated(self) -> bool {
        self.canonical() != self
    }
}

impl Display for MarkerValueString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImplementationName => f.write_str("implementation_name"),
            Self::OsName => f.write_str("os_name"),
            Self::OsNameDeprecated => f.write_str("os.name"),
            Self::PlatformMachine => f.write_str("platform_machine"),
            Self::PlatformMachineDeprecated => f.write_str("platform.machine"),
            Self::PlatformPythonImplementation => f.write_str("platform_python_implementation"),
            Self::PlatformPythonImplementationDeprecated => {
                f.write_str("platform.python_implementation")
            }
            Self::PythonImplementationDeprecated => f.write_str("python_implementation"),
            Self::PlatformRelease => f.write_str("platform_release"),
            Self::PlatformSystem => f.write_str("platform_system"),
            Self::PlatformVersion => f.write_str("platform_version"),
            Self::PlatformVersionDeprecated => f.write_str("platform.version"),
            Self::SysPlatform => f.write_str("sys_platform"),
            Self::SysPlatformDeprecated => f.write_str("sys.platform"),
        }
    }
}

/// One of the predefined environment values, a quoted string, or a key we don't know.
///
/// <https://packaging.python.org/en/latest/specifications/dependency-specifiers/#environment-markers>
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MarkerValue {
    /// Those environment markers with a PEP 440 version as value such as `python_version`
    MarkerEnvVersion(MarkerValueVersion),
    /// Those environment markers with an arbitrary string as value such as `sys_platform`
    MarkerEnvString(MarkerValueString),
    /// `extra`. This one is special because it's a list and not env but user given
    Extra,
    /// Not a constant, but a user given quoted string with a value inside such as '3.8' or "windows"
    QuotedString(String),
    /// An identifier that isn't a PEP 508 key. Clauses using it are dropped.
    Unknown(String),
}

impl FromStr for MarkerValue {
    type Err = String;

    /// This is specifically for the reserved values
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s {
            "implementation_name" => Self::MarkerEnvString(MarkerValueString::ImplementationName),
            "implementation_version" => {
                Self::MarkerEnvVersion(MarkerValueVersion::ImplementationVersion)
            }
            "os_name" => Self::MarkerEnvString(MarkerValueString::OsName),
            "os.name" => Self::MarkerEnvString(MarkerValueString::OsNameDeprecated),
            "platform_machine" => Self::MarkerEnvString(MarkerValueString::PlatformMachine),
            "platform.machine" => {
                Self::MarkerEnvString(MarkerValueString::PlatformMachineDeprecated)
            }
            "platform_python_implementation" => {
                Self::MarkerEnvString(MarkerValueString::PlatformPythonImplementation)
            }
            "platform.python_implementation" => {
                Self::MarkerEnvString(MarkerValueString::PlatformPythonImplementationDeprecated)
            }
            "python_implementation" => {
                Self::MarkerEnvString(MarkerValueString::PythonImplementationDeprecated)
            }
            "platform_release" => Self::MarkerEnvString(MarkerValueString::PlatformRelease),
            "platform_system" => Self::MarkerEnvString(MarkerValueString::PlatformSystem),
            "platform_version" => Self::MarkerEnvString(MarkerValueString::PlatformVersion),
            "platform.version" => {
                Self::MarkerEnvString(MarkerValueString::PlatformVersionDeprecated)
            }
            "python_full_version" => Self::MarkerEnvVersion(MarkerValueVersion::PythonFullVersion),
            "python_version" => Self::MarkerEnvVersion(MarkerValueVersion::PythonVersion),
            "sys_platform" => Self::MarkerEnvString(MarkerValueString::SysPlatform),
            "sys.platform" => Self::MarkerEnvString(MarkerValueString::SysPlatformDeprecated),
            "extra" => Self::Extra,
            _ => return Err(format!("Invalid key: {s}")),
        };
        Ok(value)
    }
}

impl Display for MarkerValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarkerEnvVersion(marker_value_version) => marker_value_version.fmt(f),
            Self::MarkerEnvString(marker_value_string) => marker_value_string.fmt(f),
            Self::Extra => f.write_str("extra"),
            Self::QuotedString(value) => write_quoted(f, value),
            Self::Unknown(key) => f.write_str(key),
        }
    }
}

/// How to compare key and value, such as by `==`, `>` or `not in`
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum MarkerOperator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessEqual,
    /// `~=`
    TildeEqual,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// The inverse of the `in` operator.
    ///
    /// Not valid when parsing, but `'x86' in platform_machine` is normalized to
    /// `platform_machine` contains `'x86'`.
    Contains,
    /// The inverse of the `not in` operator.
    NotContains,
}

impl MarkerOperator {
    /// Compare two versions, returning `None` for `in` and `not in`.
    pub(crate) fn to_pep440_operator(self) -> Option<Operator> {
        match self {
            Self::Equal => Some(Operator::Equal),
            Self::NotEqual => Some(Operator::NotEqual),
            Self::GreaterThan => Some(Operator::GreaterThan),
            Self::GreaterEqual => Some(Operator::GreaterThanEqual),
            Self::LessThan => Some(Operator::LessThan),
            Self::LessEqual => Some(Operator::LessThanEqual),
            Self::TildeEqual => Some(Operator::TildeEqual),
            _ => None,
        }
    }

    /// The operator to use when the operands swap sides.
    pub(crate) fn invert(self) -> Self {
        match self {
            Self::LessThan => Self::GreaterThan,
            Self::LessEqual => Self::GreaterEqual,
            Self::GreaterThan => Self::LessThan,
            Self::GreaterEqual => Self::LessEqual,
            Self::Equal => Self::Equal,
            Self::NotEqual => Self::NotEqual,
            Self::TildeEqual => Self::TildeEqual,
            Self::In => Self::Contains,
            Self::NotIn => Self::NotContains,
            Self::Contains => Self::In,
            Self::NotContains => Self::NotIn,
        }
    }
}

impl FromStr for MarkerOperator {
    type Err = String;

    /// PEP 508 allows arbitrary whitespace between "not" and "in", and so do we
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s {
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessEqual,
            "~=" => Self::TildeEqual,
            "in" => Self::In,
            not_space_in
                if not_space_in
                    .strip_prefix("not")
                    .and_then(|space_in| space_in.strip_suffix("in"))
                    .is_some_and(|space| !space.is_empty() && space.trim().is_empty()) =>
            {
                Self::NotIn
            }
            other => return Err(format!("Invalid comparator: {other}")),
        };
        Ok(value)
    }
}

impl Display for MarkerOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterEqual => ">=",
            Self::LessThan => "<",
            Self::LessEqual => "<=",
            Self::TildeEqual => "~=",
            Self::In | Self::Contains => "in",
            Self::NotIn | Self::NotContains => "not in",
        })
    }
}

/// A [`Version`], with the original string preserved for string comparisons and display.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StringVersion {
    /// Original unchanged string
    pub string: String,
    /// Parsed version
    pub version: Version,
}

impl From<Version> for StringVersion {
    fn from(version: Version) -> Self {
        Self {
            string: version.to_string(),
            version,
        }
    }
}

impl FromStr for StringVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            string: s.to_string(),
            version: Version::from_str(s)?,
        })
    }
}

impl Display for StringVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.string.fmt(f)
    }
}

impl Serialize for StringVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.string)
    }
}

impl<'de> Deserialize<'de> for StringVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;
        Self::from_str(&string).map_err(de::Error::custom)
    }
}

impl Deref for StringVersion {
    type Target = Version;

    fn deref(&self) -> &Self::Target {
        &self.version
    }
}

/// The [`ExtraName`] value used in `extra` markers.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum MarkerValueExtra {
    /// A valid [`ExtraName`].
    Extra(ExtraName),
    /// An invalid name, preserved as an arbitrary string. Never matches.
    Arbitrary(String),
}

impl MarkerValueExtra {
    /// The extra, if the name was valid.
    pub fn as_extra(&self) -> Option<&ExtraName> {
        match self {
            Self::Extra(extra) => Some(extra),
            Self::Arbitrary(_) => None,
        }
    }
}

impl Display for MarkerValueExtra {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extra(extra) => extra.fmt(f),
            Self::Arbitrary(string) => string.fmt(f),
        }
    }
}

/// The operator for an extra expression, either '==' or '!='.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum ExtraOperator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
}

impl ExtraOperator {
    /// Returns `None` if the operator is not supported for extras.
    pub(crate) fn from_marker_operator(operator: MarkerOperator) -> Option<Self> {
        match operator {
            MarkerOperator::Equal => Some(Self::Equal),
            MarkerOperator::NotEqual => Some(Self::NotEqual),
            _ => None,
        }
    }
}

impl Display for ExtraOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
        })
    }
}

/// One clause such as `python_version > "3.8"`, normalized so the key is always on the left.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(missing_docs)]
pub enum MarkerExpression {
    /// `<version key> <version op> <quoted PEP 440 version>`, including inverted forms such as
    /// `'3.8' <= python_version`.
    Version {
        key: MarkerValueVersion,
        specifier: VersionSpecifier,
    },
    /// `<version key> in <quoted list of PEP 440 versions>`, or `not in` with `negated`.
    VersionIn {
        key: MarkerValueVersion,
        versions: Vec<Version>,
        negated: bool,
    },
    /// A string marker comparison, e.g. `sys_platform == '...'`.
    String {
        key: MarkerValueString,
        operator: MarkerOperator,
        value: String,
    },
    /// `extra <extra op> '...'` or `'...' <extra op> extra`.
    Extra {
        operator: ExtraOperator,
        name: MarkerValueExtra,
    },
}

impl MarkerExpression {
    /// Determines whether the expression holds in the given environment.
    pub(crate) fn evaluate(
        &self,
        env: &MarkerEnvironment,
        extras: &[ExtraName],
        reporter: &mut impl Reporter,
    ) -> bool {
        match self {
            Self::Version { key, specifier } => specifier.contains(env.get_version(key)),
            Self::VersionIn {
                key,
                versions,
                negated,
            } => {
                let version = env.get_version(key);
                versions.iter().any(|candidate| candidate == version) != *negated
            }
            Self::String {
                key,
                operator,
                value,
            } => {
                let l_string = env.get_string(key);
                compare_strings(l_string, *operator, value, reporter)
            }
            Self::Extra { operator, name } => {
                let active = name
                    .as_extra()
                    .is_some_and(|extra| extras.contains(extra));
                match operator {
                    ExtraOperator::Equal => active,
                    ExtraOperator::NotEqual => !active,
                }
            }
        }
    }

    /// Whether this expression only involves `extra`.
    pub fn is_extra(&self) -> bool {
        matches!(self, Self::Extra { .. })
    }
}

/// Compare an environment string with a quoted string.
pub(crate) fn compare_strings(
    l_string: &str,
    operator: MarkerOperator,
    r_string: &str,
    reporter: &mut impl Reporter,
) -> bool {
    match operator {
        MarkerOperator::Equal => l_string == r_string,
        MarkerOperator::NotEqual => l_string != r_string,
        MarkerOperator::GreaterThan
        | MarkerOperator::GreaterEqual
        | MarkerOperator::LessThan
        | MarkerOperator::LessEqual => {
            reporter.report(
                MarkerWarningKind::LexicographicComparison,
                format!("Comparing {l_string} and {r_string} lexicographically"),
            );
            match operator {
                MarkerOperator::GreaterThan => l_string > r_string,
                MarkerOperator::GreaterEqual => l_string >= r_string,
                MarkerOperator::LessThan => l_string < r_string,
                _ => l_string <= r_string,
            }
        }
        MarkerOperator::TildeEqual => {
            reporter.report(
                MarkerWarningKind::LexicographicComparison,
                format!("Can't compare {l_string} and {r_string} with `~=`"),
            );
            false
        }
        MarkerOperator::In => r_string.contains(l_string),
        MarkerOperator::NotIn => !r_string.contains(l_string),
        MarkerOperator::Contains => l_string.contains(r_string),
        MarkerOperator::NotContains => !l_string.contains(r_string),
    }
}

/// Quote a marker value, preferring single quotes as the canonical form.
fn write_quoted(f: &mut Formatter<'_>, value: &str) -> fmt::Result {
    if value.contains('\'') {
        write!(f, "\"{value}\"")
    } else {
        write!(f, "'{value}'")
    }
}

impl Display for MarkerExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version { key, specifier } => {
                let (op, version) = (specifier.operator(), specifier.version());
                if op.is_star() {
                    return write!(f, "{key} {op} '{version}.*'");
                }
                write!(f, "{key} {op} '{version}'")
            }
            Self::VersionIn {
                key,
                versions,
                negated,
            } => {
                let op = if *negated { "not in" } else { "in" };
                let versions = versions.iter().map(ToString::to_string).join(" ");
                write!(f, "{key} {op} '{versions}'")
            }
            Self::String {
                key,
                operator,
                value,
            } => {
                if matches!(
                    operator,
                    MarkerOperator::Contains | MarkerOperator::NotContains
                ) {
                    write_quoted(f, value)?;
                    return write!(f, " {operator} {key}");
                }
                write!(f, "{key} {operator} ")?;
                write_quoted(f, value)
            }
            Self::Extra { operator, name } => {
                write!(f, "extra {operator} '{name}'")
            }
        }
    }
}

/// Represents one or more nested marker expressions with and/or/parentheses.
///
/// Trees built through the parser or the [`MarkerTree::and`] / [`MarkerTree::or`] combinators
/// are flattened: constants only appear at the top level, an `and` never directly contains
/// another `and`, and duplicate children are removed.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum MarkerTree {
    /// Holds in every environment.
    #[default]
    True,
    /// Holds in no environment.
    False,
    /// A single expression such as `sys_platform == 'win32'`.
    Expression(MarkerExpression),
    /// All of the children must hold.
    And(Vec<MarkerTree>),
    /// At least one of the children must hold.
    Or(Vec<MarkerTree>),
}

impl FromStr for MarkerTree {
    type Err = Pep508Error;

    fn from_str(markers: &str) -> Result<Self, Self::Err> {
        parse::parse_markers(markers, &mut TracingReporter)
    }
}

impl<'de> Deserialize<'de> for MarkerTree {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.trim().is_empty() {
            return Ok(Self::True);
        }
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for MarkerTree {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.try_to_string().unwrap_or_default())
    }
}

impl MarkerTree {
    /// Parse a marker tree, forwarding warnings to the given reporter.
    pub fn parse_reporter(markers: &str, reporter: &mut impl Reporter) -> Result<Self, Pep508Error> {
        parse::parse_markers(markers, reporter)
    }

    /// A tree consisting of a single expression.
    pub fn expression(expression: MarkerExpression) -> Self {
        Self::Expression(expression)
    }

    /// Whether the marker always holds.
    pub fn is_true(&self) -> bool {
        matches!(self, Self::True)
    }

    /// Whether the marker never holds.
    pub fn is_false(&self) -> bool {
        matches!(self, Self::False)
    }

    /// Combine the trees with `and`, folding constants and flattening nested conjunctions.
    pub fn conjunction(trees: impl IntoIterator<Item = Self>) -> Self {
        let mut children: Vec<Self> = Vec::new();
        for tree in trees {
            match tree {
                Self::True => {}
                Self::False => return Self::False,
                Self::And(inner) => {
                    for child in inner {
                        push_unique(&mut children, child);
                    }
                }
                other => push_unique(&mut children, other),
            }
        }
        match children.len() {
            0 => Self::True,
            1 => children.pop().unwrap_or_default(),
            _ => Self::And(children),
        }
    }

    /// Combine the trees with `or`, folding constants and flattening nested disjunctions.
    pub fn disjunction(trees: impl IntoIterator<Item = Self>) -> Self {
        let mut children: Vec<Self> = Vec::new();
        for tree in trees {
            match tree {
                Self::False => {}
                Self::True => return Self::True,
                Self::Or(inner) => {
                    for child in inner {
                        push_unique(&mut children, child);
                    }
                }
                other => push_unique(&mut children, other),
            }
        }
        match children.len() {
            0 => Self::False,
            1 => children.pop().unwrap_or(Self::False),
            _ => Self::Or(children),
        }
    }

    /// Combine this marker with another using `and`.
    pub fn and(&mut self, tree: Self) {
        let this = std::mem::take(self);
        *self = Self::conjunction([this, tree]);
    }

    /// Combine this marker with another using `or`.
    pub fn or(&mut self, tree: Self) {
        let this = std::mem::take(self);
        *self = Self::disjunction([this, tree]);
    }

    /// Does this marker apply in the given environment?
    pub fn evaluate(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        self.evaluate_reporter(env, extras, &mut TracingReporter)
    }

    /// Evaluates against an optional environment. Without an environment, only the `extra`
    /// expressions are evaluated and everything else counts as satisfied.
    pub fn evaluate_optional_environment(
        &self,
        env: Option<&MarkerEnvironment>,
        extras: &[ExtraName],
    ) -> bool {
        match env {
            None => self.evaluate_extras(extras),
            Some(env) => self.evaluate(env, extras),
        }
    }

    /// Same as [`Self::evaluate`], but instead of using logging to warn, you can pass your own
    /// handler for warnings
    pub fn evaluate_reporter(
        &self,
        env: &MarkerEnvironment,
        extras: &[ExtraName],
        reporter: &mut impl Reporter,
    ) -> bool {
        self.report_deprecated_options(reporter);
        self.evaluate_reporter_impl(env, extras, reporter)
    }

    fn evaluate_reporter_impl(
        &self,
        env: &MarkerEnvironment,
        extras: &[ExtraName],
        reporter: &mut impl Reporter,
    ) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Expression(expression) => expression.evaluate(env, extras, reporter),
            Self::And(children) => children
                .iter()
                .all(|child| child.evaluate_reporter_impl(env, extras, reporter)),
            Self::Or(children) => children
                .iter()
                .any(|child| child.evaluate_reporter_impl(env, extras, reporter)),
        }
    }

    /// Same as [`Self::evaluate`], but instead of using logging to warn, you get a Vec with all
    /// warnings collected
    pub fn evaluate_collect_warnings(
        &self,
        env: &MarkerEnvironment,
        extras: &[ExtraName],
    ) -> (bool, Vec<(MarkerWarningKind, String)>) {
        let mut warnings = Vec::new();
        let mut reporter = |kind, warning| {
            warnings.push((kind, warning));
        };
        let result = self.evaluate_reporter(env, extras, &mut reporter);
        (result, warnings)
    }

    /// Checks if the requirement should be activated with the given set of active extras without
    /// evaluating the remaining environment markers, i.e. if there is potentially an environment
    /// that could activate this requirement.
    pub fn evaluate_extras(&self, extras: &[ExtraName]) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Expression(expression @ MarkerExpression::Extra { .. }) => {
                expression.evaluate_extras(extras)
            }
            Self::Expression(_) => true,
            Self::And(children) => children.iter().all(|child| child.evaluate_extras(extras)),
            Self::Or(children) => children.iter().any(|child| child.evaluate_extras(extras)),
        }
    }

    /// Calls `visit` for every expression in the tree, depth-first.
    pub fn visit_expressions<'a>(&'a self, visit: &mut impl FnMut(&'a MarkerExpression)) {
        match self {
            Self::True | Self::False => {}
            Self::Expression(expression) => visit(expression),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.visit_expressions(visit);
                }
            }
        }
    }

    /// Report the deprecated marker from <https://peps.python.org/pep-0345/#environment-markers>
    fn report_deprecated_options(&self, reporter: &mut impl Reporter) {
        self.visit_expressions(&mut |expression| {
            if let MarkerExpression::String { key, .. } = expression {
                if key.is_deprecated() {
                    reporter.report(
                        MarkerWarningKind::DeprecatedMarkerName,
                        format!("{key} is deprecated in favor of {}", key.canonical()),
                    );
                }
            }
        });
    }

    /// The displayable contents of the marker, or `None` if it always holds.
    pub fn contents(&self) -> Option<MarkerTreeContents> {
        if self.is_true() {
            return None;
        }
        Some(MarkerTreeContents(self.clone()))
    }

    /// The marker as a string, or `None` if it always holds.
    pub fn try_to_string(&self) -> Option<String> {
        self.contents().map(|contents| contents.to_string())
    }
}

impl MarkerExpression {
    fn evaluate_extras(&self, extras: &[ExtraName]) -> bool {
        match self {
            Self::Extra { operator, name } => {
                let active = name
                    .as_extra()
                    .is_some_and(|extra| extras.contains(extra));
                match operator {
                    ExtraOperator::Equal => active,
                    ExtraOperator::NotEqual => !active,
                }
            }
            _ => true,
        }
    }
}

fn push_unique(children: &mut Vec<MarkerTree>, child: MarkerTree) {
    if !children.contains(&child) {
        children.push(child);
    }
}

/// A marker that doesn't always hold, and can therefore be written out.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MarkerTreeContents(MarkerTree);

impl From<MarkerTreeContents> for MarkerTree {
    fn from(contents: MarkerTreeContents) -> Self {
        contents.0
    }
}

impl Deref for MarkerTreeContents {
    type Target = MarkerTree;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for MarkerTreeContents {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt_tree(&self.0, f)
    }
}

fn fmt_tree(tree: &MarkerTree, f: &mut Formatter<'_>) -> fmt::Result {
    match tree {
        // Normalize all `true` and `false` expressions to the same trivial expressions.
        MarkerTree::True => f.write_str("python_version >= '0'"),
        MarkerTree::False => f.write_str("python_version < '0'"),
        MarkerTree::Expression(expression) => expression.fmt(f),
        MarkerTree::And(children) => {
            for (index, child) in children.iter().enumerate() {
                if index > 0 {
                    f.write_str(" and ")?;
                }
                if matches!(child, MarkerTree::Or(_)) {
                    f.write_str("(")?;
                    fmt_tree(child, f)?;
                    f.write_str(")")?;
                } else {
                    fmt_tree(child, f)?;
                }
            }
            Ok(())
        }
        MarkerTree::Or(children) => {
            for (index, child) in children.iter().enumerate() {
                if index > 0 {
                    f.write_str(" or ")?;
                }
                if matches!(child, MarkerTree::And(_)) {
                    f.write_str("(")?;
                    fmt_tree(child, f)?;
                    f.write_str(")")?;
                } else {
                    fmt_tree(child, f)?;
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indoc::indoc;

    use tether_normalize::ExtraName;

    use crate::marker::{MarkerEnvironment, MarkerEnvironmentBuilder};
    use crate::{MarkerExpression, MarkerOperator, MarkerTree, MarkerValueString};

    use super::MarkerWarningKind;

    fn parse_err(input: &str) -> String {
        MarkerTree::from_str(input).unwrap_err().to_string()
    }

    fn m(s: &str) -> MarkerTree {
        s.parse().unwrap()
    }

    fn env(python_version: &str, sys_platform: &str) -> MarkerEnvironment {
        MarkerEnvironment::try_from(MarkerEnvironmentBuilder {
            implementation_name: "cpython",
            implementation_version: python_version,
            os_name: "posix",
            platform_machine: "x86_64",
            platform_python_implementation: "CPython",
            platform_release: "",
            platform_system: "Linux",
            platform_version: "#1 SMP Ubuntu",
            python_full_version: python_version,
            python_version,
            sys_platform,
        })
        .unwrap()
    }

    /// Adapted from <https://github.com/pypa/packaging/blob/85ff971a250dc01db188ef9775499c15553a8c95/tests/test_markers.py#L175-L221>
    #[test]
    fn marker_equivalence() {
        let values = [
            (r"python_version == '2.7'", r#"python_version == "2.7""#),
            (
                r#"python_version == "2.7" and os_name == "posix""#,
                r#"python_version == "2.7" and os_name == "posix""#,
            ),
            (
                r#"python_version == "2.7" and os_name == "posix" or sys_platform == "win32""#,
                r#"(python_version == "2.7" and os_name == "posix") or sys_platform == "win32""#,
            ),
            (r#"(python_version == "2.7")"#, r#"python_version == "2.7""#),
            (
                r#"(python_version == "2.7" and sys_platform == "win32")"#,
                r#"python_version == "2.7" and sys_platform == "win32""#,
            ),
            (
                r#"python_version == "2.7" and (sys_platform == "win32" and os_name == "nt")"#,
                r#"python_version == "2.7" and sys_platform == "win32" and os_name == "nt""#,
            ),
            (
                r#"'linux' == sys_platform"#,
                r#"sys_platform == 'linux'"#,
            ),
            (
                r#"'3.8' < python_version"#,
                r#"python_version > '3.8'"#,
            ),
        ];
        for (a, b) in values {
            assert_eq!(m(a), m(b), "{a} {b}");
        }
    }

    #[test]
    fn marker_evaluation() {
        let env27 = env("2.7", "linux");
        let env37 = env("3.7", "linux");
        let marker1 = m("python_version == '2.7'");
        let marker2 =
            m("os_name == \"posix\" or python_version == \"3.7\" and sys_platform == \"win32\"");
        let marker3 = m(
            "python_version == \"2.7\" and (sys_platform == \"win32\" or sys_platform == \"linux\")",
        );
        assert!(marker1.evaluate(&env27, &[]));
        assert!(!marker1.evaluate(&env37, &[]));
        assert!(marker2.evaluate(&env27, &[]));
        assert!(marker2.evaluate(&env37, &[]));
        assert!(marker3.evaluate(&env27, &[]));
        assert!(!marker3.evaluate(&env37, &[]));
    }

    #[test]
    fn version_in_evaluation() {
        let env27 = env("2.7", "linux");
        let env37 = env("3.7", "linux");

        let marker = m("python_version in \"2.7 3.2 3.3\"");
        assert!(marker.evaluate(&env27, &[]));
        assert!(!marker.evaluate(&env37, &[]));

        let marker = m("python_version not in \"2.7 3.7\"");
        assert!(!marker.evaluate(&env27, &[]));
        assert!(!marker.evaluate(&env37, &[]));

        let marker = m("python_version not in \"2.4 3.8 4.0\"");
        assert!(marker.evaluate(&env27, &[]));
        assert!(marker.evaluate(&env37, &[]));
    }

    #[test]
    fn string_in_evaluation() {
        let linux = env("3.12", "linux");
        let windows = env("3.12", "win32");

        let marker = m("sys_platform in 'linux darwin'");
        assert!(marker.evaluate(&linux, &[]));
        assert!(!marker.evaluate(&windows, &[]));

        let marker = m("'Ubuntu' in platform_version");
        assert!(marker.evaluate(&linux, &[]));

        let marker = m("'x86' not in platform_machine");
        assert!(!marker.evaluate(&linux, &[]));
    }

    #[test]
    fn extra_evaluation() {
        let env = env("3.12", "linux");
        let marker = m("extra == 'Pretty_Print'");
        let extra = ExtraName::from_str("pretty-print").unwrap();
        assert!(marker.evaluate(&env, std::slice::from_ref(&extra)));
        assert!(!marker.evaluate(&env, &[]));
        assert!(m("'pretty-print' != extra").evaluate(&env, &[]));
        assert!(m("extra == 'pretty' and sys_platform == 'win32'").evaluate_extras(&[
            ExtraName::from_str("pretty").unwrap()
        ]));
    }

    #[test]
    fn version_star_and_tilde() {
        let env37 = env("3.7", "linux");
        let (result, warnings) = m("python_version == '3.7.*'").evaluate_collect_warnings(&env37, &[]);
        assert_eq!(warnings, &[]);
        assert!(result);

        let (result, warnings) = m("python_version ~= '3.7'").evaluate_collect_warnings(&env37, &[]);
        assert_eq!(warnings, &[]);
        assert!(result);
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let env = env("3.12", "linux");
        let mut warnings = Vec::new();
        let marker = MarkerTree::parse_reporter(
            "platform_tag == 'manylinux' or sys_platform == 'win32'",
            &mut |kind, message| warnings.push((kind, message)),
        )
        .unwrap();
        assert_eq!(marker, m("sys_platform == 'win32'"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].0, MarkerWarningKind::UnknownMarkerName);

        // A marker made only of unknown keys places no constraint at all.
        let marker = m("platform_tag == 'manylinux'");
        assert!(marker.is_true());
        assert!(marker.evaluate(&env, &[]));
    }

    #[test]
    fn warnings() {
        let env = env("3.7", "linux");
        let (_, warnings) = m("platform_release >= '5.4'").evaluate_collect_warnings(&env, &[]);
        assert_eq!(
            warnings,
            &[(
                MarkerWarningKind::LexicographicComparison,
                "Comparing  and 5.4 lexicographically".to_string()
            )]
        );

        let (_, warnings) = m("os.name == 'posix' and sys.platform == 'linux'")
            .evaluate_collect_warnings(&env, &[]);
        let messages: Vec<_> = warnings
            .iter()
            .map(|(kind, message)| {
                assert_eq!(*kind, MarkerWarningKind::DeprecatedMarkerName);
                message.as_str()
            })
            .collect();
        assert_eq!(
            messages,
            &[
                "os.name is deprecated in favor of os_name",
                "sys.platform is deprecated in favor of sys_platform",
            ]
        );

        let mut warnings = Vec::new();
        let marker = MarkerTree::parse_reporter("python_version >= '3.9.'", &mut |kind, message| {
            warnings.push((kind, message));
        })
        .unwrap();
        assert!(marker.is_true());
        assert_eq!(warnings[0].0, MarkerWarningKind::Pep440Error);
    }

    #[test]
    fn constant_comparisons() {
        assert!(m("'b' >= 'a'").is_true());
        assert!(m("'b' == 'a'").is_false());
        assert!(m("'b' == 'a' or sys_platform == 'linux'") == m("sys_platform == 'linux'"));
    }

    #[test]
    fn combinators() {
        let mut marker = m("sys_platform == 'win32'");
        marker.and(m("python_version >= '3.8'"));
        assert_eq!(
            marker.try_to_string().unwrap(),
            "sys_platform == 'win32' and python_version >= '3.8'"
        );
        marker.or(m("os_name == 'nt'"));
        assert_eq!(
            marker.try_to_string().unwrap(),
            "(sys_platform == 'win32' and python_version >= '3.8') or os_name == 'nt'"
        );

        let mut marker = MarkerTree::True;
        marker.and(m("sys_platform == 'win32'"));
        assert_eq!(marker, m("sys_platform == 'win32'"));
        marker.or(MarkerTree::True);
        assert!(marker.is_true());
        assert_eq!(marker.try_to_string(), None);
    }

    #[test]
    fn display() {
        let marker = m(r#"python_version == "2.7" and (sys_platform == "win32" or sys_platform == "linux")"#);
        assert_eq!(
            marker.try_to_string().unwrap(),
            "python_version == '2.7' and (sys_platform == 'win32' or sys_platform == 'linux')"
        );
        assert_eq!(
            m("'x86' in platform_machine").try_to_string().unwrap(),
            "'x86' in platform_machine"
        );
        assert_eq!(
            m("python_version == '3.8.*'").try_to_string().unwrap(),
            "python_version == '3.8.*'"
        );
        assert_eq!(
            m("extra == 'Pretty_Print'").try_to_string().unwrap(),
            "extra == 'pretty-print'"
        );
    }

    #[test]
    fn expression_shape() {
        assert_eq!(
            m(r#"os_name == "nt""#),
            MarkerTree::Expression(MarkerExpression::String {
                key: MarkerValueString::OsName,
                operator: MarkerOperator::Equal,
                value: "nt".to_string(),
            })
        );
        assert!(matches!(
            m("'x86' in platform_machine"),
            MarkerTree::Expression(MarkerExpression::String {
                operator: MarkerOperator::Contains,
                ..
            })
        ));
    }

    #[test]
    fn closing_parentheses() {
        m(r#"( "linux" in sys_platform) and extra == 'all'"#);
    }

    #[test]
    fn wrong_quotes_dot_star() {
        assert_eq!(
            parse_err(r#"python_version == "3.8".* and python_version >= "3.8""#),
            indoc! {r#"
                Unexpected character '.', expected 'and', 'or' or end of input
                python_version == "3.8".* and python_version >= "3.8"
                                       ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^"#
            },
        );
        assert_eq!(
            parse_err(r#"python_version == "3.8".*"#),
            indoc! {r#"
                Unexpected character '.', expected 'and', 'or' or end of input
                python_version == "3.8".*
                                       ^^"#
            },
        );
    }

    #[test]
    fn invalid_key_characters() {
        assert_eq!(
            parse_err("python-version == '3.8'"),
            indoc! {"
                Expected a valid marker name, found 'python-version'
                python-version == '3.8'
                ^^^^^^^^^^^^^^"
            },
        );
    }

    #[test]
    fn invalid_operator() {
        assert_eq!(
            parse_err("sys_platform =! 'win32'"),
            indoc! {"
                Expected a valid marker operator (such as '>=' or 'not in'), found '=!'
                sys_platform =! 'win32'
                             ^^"
            },
        );
    }

    #[test]
    fn missing_value() {
        assert_eq!(
            parse_err("sys_platform =="),
            [
                "Expected marker value, found end of dependency specification",
                "sys_platform ==",
                "               ^",
            ]
            .join("\n"),
        );
    }

    #[test]
    fn serde_round_trip() {
        let marker = m("sys_platform == 'win32' and python_version < '3.8'");
        let json = serde_json::to_string(&marker).unwrap();
        assert_eq!(json, r#""sys_platform == 'win32' and python_version < '3.8'""#);
        let parsed: MarkerTree = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, marker);
        let empty: MarkerTree = serde_json::from_str(r#""""#).unwrap();
        assert!(empty.is_true());
    }
}
