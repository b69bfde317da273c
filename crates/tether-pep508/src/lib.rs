//! Dependency specifiers and environment markers.
//!
//! A dependency is declared as a name, optional extras, a version constraint and an optional
//! marker, e.g. `requests [security] >=2.8.1, ==2.8.* ; python_version > "3.8"`. The version part
//! accepts the lock-file constraint syntax of [`VersionConstraint`], so caret, tilde and `||`
//! ranges are valid here as well. URL requirements are rejected.
//!
//! ```
//! use std::str::FromStr;
//! use tether_pep508::Requirement;
//!
//! let requirement = Requirement::from_str("attrs[tests] >=19,<21 ; python_version >= '3.7'").unwrap();
//! assert_eq!(requirement.name.as_str(), "attrs");
//! ```

#![warn(missing_docs)]

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;
use unicode_width::UnicodeWidthChar;

use tether_normalize::{ExtraName, PackageName};
use tether_pep440::VersionConstraint;

pub use crate::marker::{
    ExtraOperator, MarkerContext, MarkerEnvironment, MarkerEnvironmentBuilder, MarkerExpression,
    MarkerOperator, MarkerTree, MarkerTreeContents, MarkerValue, MarkerValueExtra,
    MarkerValueString, MarkerValueVersion, MarkerWarningKind, StringVersion, SymbolicMarker,
};

use crate::cursor::Cursor;

mod cursor;
mod marker;

/// Error with a span attached. `start` and `len` are byte offsets into `input`.
#[derive(Debug)]
pub struct Pep508Error {
    /// Either we have an error string from our parser or an unsupported requirement.
    pub message: Pep508ErrorSource,
    /// Span start index
    pub start: usize,
    /// Span length
    pub len: usize,
    /// The input string so we can print it underlined
    pub input: String,
}

/// The reason a dependency specifier or marker was rejected.
#[derive(Debug, Error)]
pub enum Pep508ErrorSource {
    /// An error from our parser.
    #[error("{0}")]
    String(String),
    /// The requirement is valid PEP 508 but can't be expressed in a lock-file constraint.
    #[error("{0}")]
    UnsupportedRequirement(String),
}

impl Display for Pep508Error {
    /// Pretty formatting with underline.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let start = self.start.min(self.input.len());
        let start_offset = self.input[..start]
            .chars()
            .flat_map(UnicodeWidthChar::width)
            .sum::<usize>();
        let underline_len = if start == self.input.len() {
            // One past the end of the input
            1
        } else {
            let end = (start + self.len).min(self.input.len());
            self.input[start..end]
                .chars()
                .flat_map(UnicodeWidthChar::width)
                .sum::<usize>()
                .max(1)
        };
        write!(
            f,
            "{}\n{}\n{}{}",
            self.message,
            self.input,
            " ".repeat(start_offset),
            "^".repeat(underline_len)
        )
    }
}

/// We need this to allow e.g. anyhow's `.context()`
impl std::error::Error for Pep508Error {}

/// Receives the warnings emitted while parsing or evaluating markers.
pub trait Reporter {
    /// Report a warning.
    fn report(&mut self, kind: MarkerWarningKind, warning: String);
}

impl<F> Reporter for F
where
    F: FnMut(MarkerWarningKind, String),
{
    fn report(&mut self, kind: MarkerWarningKind, warning: String) {
        (self)(kind, warning);
    }
}

/// A [`Reporter`] that logs every warning through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&mut self, _kind: MarkerWarningKind, message: String) {
        tracing::warn!("{message}");
    }
}

/// Parse a marker expression such as `sys_platform == 'win32' and python_version < '3.8'`.
///
/// Clauses on unknown environment keys are dropped with a warning.
pub fn parse_marker(markers: &str) -> Result<MarkerTree, Pep508Error> {
    MarkerTree::from_str(markers)
}

/// A dependency specification: `name[extras] constraint ; marker`.
#[derive(Hash, Debug, Clone, Eq, PartialEq)]
pub struct Requirement {
    /// The distribution name such as `attrs` in `attrs[tests] >=19,<21 ; python_version > "3.8"`.
    pub name: PackageName,
    /// The requested extras such as `tests`.
    pub extras: Vec<ExtraName>,
    /// The version constraint such as `>=19,<21`. Any version if omitted.
    pub version: VersionConstraint,
    /// The marker such as `python_version > "3.8"`. Always true if omitted.
    pub marker: MarkerTree,
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(
                f,
                "[{}]",
                self.extras
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            )?;
        }
        if !self.version.is_any() {
            write!(f, " {}", self.version)?;
        }
        if let Some(marker) = self.marker.contents() {
            write!(f, " ; {marker}")?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for Requirement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl FromStr for Requirement {
    type Err = Pep508Error;

    /// Parse a dependency specification, logging marker warnings.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse(&mut Cursor::new(input), &mut TracingReporter)
    }
}

impl Requirement {
    /// Parse a dependency specification, forwarding marker warnings to the reporter.
    pub fn parse_reporter(input: &str, reporter: &mut impl Reporter) -> Result<Self, Pep508Error> {
        parse(&mut Cursor::new(input), reporter)
    }

    /// Whether the requirement applies in the given environment with the given active extras.
    pub fn evaluate_markers(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        self.marker.evaluate(env, extras)
    }
}

fn parse_name(cursor: &mut Cursor) -> Result<PackageName, Pep508Error> {
    // https://peps.python.org/pep-0508/#names
    // ^([A-Z0-9]|[A-Z0-9][A-Z0-9._-]*[A-Z0-9])$ with re.IGNORECASE
    let start = cursor.pos();
    let mut name = String::new();
    if let Some((index, char)) = cursor.next() {
        if matches!(char, 'A'..='Z' | 'a'..='z' | '0'..='9') {
            name.push(char);
        } else {
            return Err(cursor.unexpected(
                format!(
                    "Expected package name starting with an alphanumeric character, found '{char}'"
                ),
                index,
                char,
            ));
        }
    } else {
        return Err(cursor.error("Empty field is not allowed for PEP508", 0, 1));
    }

    loop {
        match cursor.peek() {
            Some((index, char @ ('A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '-' | '_'))) => {
                name.push(char);
                cursor.next();
                // [.-_] can't be the final character
                if cursor.peek().is_none() && matches!(char, '.' | '-' | '_') {
                    return Err(cursor.unexpected(
                        format!(
                            "Package name must end with an alphanumeric character, not '{char}'"
                        ),
                        index,
                        char,
                    ));
                }
            }
            Some(_) | None => {
                let len = cursor.pos() - start;
                return PackageName::new(name)
                    .map_err(|err| cursor.error(err.to_string(), start, len));
            }
        }
    }
}

const MISSING_BRACKET: &str =
    "Missing closing bracket (expected ']', found end of dependency specification)";

/// Parses extras in the `[extra1,extra2]` format.
fn parse_extras(cursor: &mut Cursor) -> Result<Vec<ExtraName>, Pep508Error> {
    let Some(bracket_pos) = cursor.eat_char('[') else {
        return Ok(vec![]);
    };
    let mut extras = Vec::new();

    loop {
        // wsp* before the identifier
        cursor.eat_whitespace();
        let mut buffer = String::new();

        // First char of the identifier
        let name_start = match cursor.next() {
            // letterOrDigit
            Some((pos, alphanumeric @ ('a'..='z' | 'A'..='Z' | '0'..='9'))) => {
                buffer.push(alphanumeric);
                pos
            }
            Some((pos, other)) => {
                return Err(cursor.unexpected(
                    format!(
                        "Expected an alphanumeric character starting the extra name, found '{other}'"
                    ),
                    pos,
                    other,
                ));
            }
            None => return Err(cursor.error(MISSING_BRACKET, bracket_pos, 1)),
        };
        // identifier_end = letterOrDigit | (('-' | '_' | '.' )* letterOrDigit)
        let (_, rest) = cursor
            .take_str(|char| matches!(char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.'));
        buffer.push_str(rest);
        match cursor.peek() {
            Some((pos, char)) if char != ',' && char != ']' && !char.is_whitespace() => {
                return Err(cursor.unexpected(
                    format!(
                        "Invalid character in extras name, expected an alphanumeric character, '-', '_', '.', ',' or ']', found '{char}'"
                    ),
                    pos,
                    char,
                ));
            }
            _ => {}
        }
        let name_len = cursor.pos() - name_start;
        let extra = ExtraName::new(buffer)
            .map_err(|err| cursor.error(err.to_string(), name_start, name_len))?;
        // wsp* after the identifier
        cursor.eat_whitespace();
        // end or next identifier?
        match cursor.next() {
            Some((_, ',')) => extras.push(extra),
            Some((_, ']')) => {
                extras.push(extra);
                break;
            }
            Some((pos, other)) => {
                return Err(cursor.unexpected(
                    format!(
                        "Expected either ',' (separating extras) or ']' (ending the extras section), found '{other}'"
                    ),
                    pos,
                    other,
                ));
            }
            None => return Err(cursor.error(MISSING_BRACKET, bracket_pos, 1)),
        }
    }

    Ok(extras)
}

/// Parse the text between `start` and `end` as a [`VersionConstraint`], pointing errors at the
/// failing clause.
fn parse_constraint(
    cursor: &Cursor,
    start: usize,
    end: usize,
) -> Result<VersionConstraint, Pep508Error> {
    VersionConstraint::from_str(cursor.slice(start, end)).map_err(|err| {
        let span = err.span();
        cursor.error(err.reason(), start + span.start, span.end - span.start)
    })
}

/// Such as `>=1.19,<2.0` or `^1.2 || ^2.0`, delimited by the end of the input or a `;` for the
/// marker part.
fn parse_version_constraint(cursor: &mut Cursor) -> Result<VersionConstraint, Pep508Error> {
    let (start, text) = cursor.take_str(|char| char != ';');
    // Leave trailing whitespace to the caller
    parse_constraint(cursor, start, start + text.trim_end().len())
}

/// Such as `(>=1.19,<2.0)`.
fn parse_version_constraint_parentheses(
    cursor: &mut Cursor,
) -> Result<VersionConstraint, Pep508Error> {
    let brace_pos = cursor.pos();
    cursor.next();
    // Makes for slightly better error underline
    cursor.eat_whitespace();
    let (start, text) = cursor.take_str(|char| char != ')');
    if cursor.eat_char(')').is_none() {
        return Err(cursor.error(
            "Missing closing parenthesis (expected ')', found end of dependency specification)",
            brace_pos,
            1,
        ));
    }
    parse_constraint(cursor, start, start + text.len())
}

/// Parse a dependency specifier.
fn parse(cursor: &mut Cursor, reporter: &mut impl Reporter) -> Result<Requirement, Pep508Error> {
    // ```text
    // specification = wsp* name wsp* extras? wsp* (('(' constraint ')') | constraint)? wsp* (';' wsp* marker)? wsp*
    // ```
    // wsp*
    cursor.eat_whitespace();
    // name
    let name = parse_name(cursor)?;
    // wsp*
    cursor.eat_whitespace();
    // extras?
    let extras = parse_extras(cursor)?;
    // wsp*
    cursor.eat_whitespace();

    let version = match cursor.peek() {
        Some((_, '(')) => parse_version_constraint_parentheses(cursor)?,
        Some((_, '<' | '=' | '>' | '~' | '!' | '^' | '*' | '0'..='9')) => {
            parse_version_constraint(cursor)?
        }
        Some((_, ';')) | None => VersionConstraint::any(),
        Some((pos, '@')) => {
            return Err(cursor.unsupported("URL requirements are not supported", pos));
        }
        Some((pos, other)) => {
            return Err(cursor.unexpected(
                format!(
                    "Expected one of `(`, `<`, `=`, `>`, `~`, `!`, `^`, `*`, `;`, found `{other}`"
                ),
                pos,
                other,
            ));
        }
    };

    // wsp*
    cursor.eat_whitespace();
    // quoted_marker?
    let marker = if cursor.peek_char() == Some(';') {
        // Skip past the semicolon
        cursor.next();
        Some(marker::parse::parse_markers_cursor(cursor, reporter)?)
    } else {
        None
    };
    // wsp*
    cursor.eat_whitespace();
    if let Some((pos, char)) = cursor.next() {
        let message = if marker.is_none() {
            format!(r#"Expected end of input or ';', found '{char}'"#)
        } else {
            format!(r#"Expected end of input, found '{char}'"#)
        };
        return Err(cursor.unexpected(message, pos, char));
    }

    Ok(Requirement {
        name,
        extras,
        version,
        marker: marker.unwrap_or_default(),
    })
}
