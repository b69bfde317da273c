use std::str::FromStr;

use tether_normalize::ExtraName;
use tether_pep440::{Version, VersionSpecifier};

use crate::cursor::Cursor;
use crate::marker::tree::compare_strings;
use crate::{
    ExtraOperator, MarkerExpression, MarkerOperator, MarkerTree, MarkerValue, MarkerValueExtra,
    MarkerValueString, MarkerValueVersion, MarkerWarningKind, Pep508Error, Reporter,
};

/// ```text
/// version_cmp   = wsp* <'<=' | '<' | '!=' | '==' | '>=' | '>' | '~=' | '==='>
/// marker_op     = version_cmp | (wsp* 'in') | (wsp* 'not' wsp+ 'in')
/// ```
fn parse_marker_operator(cursor: &mut Cursor) -> Result<MarkerOperator, Pep508Error> {
    let (start, operator) =
        cursor.take_str(|char| !char.is_whitespace() && char != '\'' && char != '"');
    if operator == "not" {
        // 'not' wsp+ 'in'
        match cursor.next() {
            None => {
                return Err(cursor.error(
                    "Expected whitespace after 'not', found end of input",
                    cursor.pos(),
                    1,
                ));
            }
            Some((_, whitespace)) if whitespace.is_whitespace() => {}
            Some((pos, other)) => {
                return Err(cursor.unexpected(
                    format!("Expected whitespace after 'not', found '{other}'"),
                    pos,
                    other,
                ));
            }
        }
        cursor.eat_whitespace();
        cursor.next_expect_char('i', cursor.pos())?;
        cursor.next_expect_char('n', cursor.pos())?;
        return Ok(MarkerOperator::NotIn);
    }
    MarkerOperator::from_str(operator).map_err(|_| {
        cursor.error(
            format!(
                "Expected a valid marker operator (such as '>=' or 'not in'), found '{operator}'"
            ),
            start,
            operator.len(),
        )
    })
}

/// Whether an unquoted marker value looks like a key, as opposed to a typo such as
/// `python-version`.
fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|char| char.is_ascii_alphanumeric() || char == '_' || char == '.')
}

/// Either a single or double quoted string or one of '`python_version`', '`python_full_version`',
/// '`os_name`', '`sys_platform`', '`platform_release`', '`platform_system`', '`platform_version`',
/// '`platform_machine`', '`platform_python_implementation`', '`implementation_name`',
/// '`implementation_version`', 'extra'.
///
/// Any other identifier is accepted as [`MarkerValue::Unknown`].
fn parse_marker_value(cursor: &mut Cursor) -> Result<MarkerValue, Pep508Error> {
    // > User supplied constants are always encoded as strings with either ' or " quote marks. Note
    // > that backslash escapes are not defined, but existing implementations do support them.
    match cursor.peek() {
        None => Err(cursor.error(
            "Expected marker value, found end of dependency specification",
            cursor.pos(),
            1,
        )),
        // It can be a string ...
        Some((start_pos, quotation_mark @ ('"' | '\''))) => {
            cursor.next();
            let (_, value) = cursor.take_str(|c| c != quotation_mark);
            cursor.next_expect_char(quotation_mark, start_pos)?;
            Ok(MarkerValue::QuotedString(value.to_string()))
        }
        // ... or it can be a keyword
        Some(_) => {
            let (start, key) = cursor.take_str(|char| {
                !char.is_whitespace() && !['>', '=', '<', '!', '~', ')'].contains(&char)
            });
            match MarkerValue::from_str(key) {
                Ok(value) => Ok(value),
                Err(_) if is_identifier(key) => Ok(MarkerValue::Unknown(key.to_string())),
                Err(_) => Err(cursor.error(
                    format!("Expected a valid marker name, found '{key}'"),
                    start,
                    key.len(),
                )),
            }
        }
    }
}

/// ```text
/// marker_var:l marker_op:o marker_var:r
/// ```
///
/// Returns `None` for clauses that are dropped, such as comparisons on unknown keys.
fn parse_marker_key_op_value(
    cursor: &mut Cursor,
    reporter: &mut impl Reporter,
) -> Result<Option<MarkerTree>, Pep508Error> {
    cursor.eat_whitespace();
    let l_value = parse_marker_value(cursor)?;
    cursor.eat_whitespace();
    // "not in" and "in" must be preceded by whitespace. We must already have matched a whitespace
    // when we're here because other `parse_marker_key` would have pulled the characters in and
    // errored
    let operator = parse_marker_operator(cursor)?;
    cursor.eat_whitespace();
    let r_value = parse_marker_value(cursor)?;

    let clause = match (l_value, r_value) {
        (MarkerValue::Unknown(key), _) | (_, MarkerValue::Unknown(key)) => {
            reporter.report(
                MarkerWarningKind::UnknownMarkerName,
                format!("Unknown marker name `{key}`, the clause will be ignored"),
            );
            None
        }
        // `python_version > '3.8'`
        (MarkerValue::MarkerEnvVersion(key), MarkerValue::QuotedString(value)) => {
            parse_version_expr(key, operator, &value, reporter).map(MarkerTree::Expression)
        }
        // `'3.8' < python_version`
        (MarkerValue::QuotedString(value), MarkerValue::MarkerEnvVersion(key)) => {
            parse_version_expr(key, operator.invert(), &value, reporter)
                .map(MarkerTree::Expression)
        }
        // `sys_platform == 'linux'`
        (MarkerValue::MarkerEnvString(key), MarkerValue::QuotedString(value)) => {
            parse_string_expr(key, operator, value, reporter)
        }
        // `'linux' == sys_platform`
        (MarkerValue::QuotedString(value), MarkerValue::MarkerEnvString(key)) => {
            parse_string_expr(key, operator.invert(), value, reporter)
        }
        // `extra == 'security'`
        (MarkerValue::Extra, MarkerValue::QuotedString(value))
        | (MarkerValue::QuotedString(value), MarkerValue::Extra) => {
            parse_extra_expr(operator, &value, reporter)
        }
        // `'3.9' > '3.10'`, a constant
        (MarkerValue::QuotedString(l_string), MarkerValue::QuotedString(r_string)) => {
            let result = compare_strings(&l_string, operator, &r_string, reporter);
            reporter.report(
                MarkerWarningKind::StringStringComparison,
                format!(
                    "Comparing two quoted strings with each other doesn't make sense: \
                    '{l_string}' {operator} '{r_string}', evaluating to {result}"
                ),
            );
            Some(if result {
                MarkerTree::True
            } else {
                MarkerTree::False
            })
        }
        // `extra == os_name`
        (MarkerValue::Extra, _) | (_, MarkerValue::Extra) => {
            reporter.report(
                MarkerWarningKind::ExtraInvalidComparison,
                "Comparing extra with something other than a quoted string is wrong, \
                the clause will be ignored"
                    .to_string(),
            );
            None
        }
        // `os_name == sys_platform`
        (l_value, r_value) => {
            reporter.report(
                MarkerWarningKind::MarkerMarkerComparison,
                format!(
                    "Comparing two markers with each other doesn't make any sense \
                    ({l_value} {operator} {r_value}), the clause will be ignored"
                ),
            );
            None
        }
    };

    Ok(clause)
}

/// `<version key> <op> '<version>'`, where the operator was already normalized to have the key
/// on the left.
fn parse_version_expr(
    key: MarkerValueVersion,
    operator: MarkerOperator,
    value: &str,
    reporter: &mut impl Reporter,
) -> Option<MarkerExpression> {
    if matches!(operator, MarkerOperator::In | MarkerOperator::NotIn) {
        return parse_version_in_expr(key, operator, value, reporter);
    }

    let Some(pep440_operator) = operator.to_pep440_operator() else {
        reporter.report(
            MarkerWarningKind::Pep440Error,
            format!(
                "Expected a PEP 440 comparison to compare {key} with '{value}', \
                found '{operator}', the clause will be ignored"
            ),
        );
        return None;
    };

    let (version, star) = match Version::from_str_star(value) {
        Ok(parsed) => parsed,
        Err(err) => {
            reporter.report(
                MarkerWarningKind::Pep440Error,
                format!(
                    "Expected PEP 440 version to compare with {key}, found '{value}', \
                    the clause will be ignored: {err}"
                ),
            );
            return None;
        }
    };

    match VersionSpecifier::from_pattern(pep440_operator, version, star) {
        Ok(specifier) => Some(MarkerExpression::Version { key, specifier }),
        Err(err) => {
            reporter.report(
                MarkerWarningKind::Pep440Error,
                format!(
                    "Invalid comparison {key} {operator} '{value}', the clause will be ignored: {err}"
                ),
            );
            None
        }
    }
}

/// `python_version in '2.7 3.7'`: a whitespace-separated list of versions.
fn parse_version_in_expr(
    key: MarkerValueVersion,
    operator: MarkerOperator,
    value: &str,
    reporter: &mut impl Reporter,
) -> Option<MarkerExpression> {
    let mut versions = Vec::new();
    for version in value.split_whitespace() {
        match Version::from_str(version) {
            Ok(version) => versions.push(version),
            Err(err) => {
                reporter.report(
                    MarkerWarningKind::Pep440Error,
                    format!(
                        "Expected a list of PEP 440 versions to compare with {key}, found '{value}', \
                        the clause will be ignored: {err}"
                    ),
                );
                return None;
            }
        }
    }
    Some(MarkerExpression::VersionIn {
        key,
        versions,
        negated: operator == MarkerOperator::NotIn,
    })
}

fn parse_string_expr(
    key: MarkerValueString,
    operator: MarkerOperator,
    value: String,
    reporter: &mut impl Reporter,
) -> Option<MarkerTree> {
    if operator == MarkerOperator::TildeEqual {
        reporter.report(
            MarkerWarningKind::LexicographicComparison,
            format!("Can't compare {key} with `~=`, the clause will be ignored"),
        );
        return None;
    }
    Some(MarkerTree::Expression(MarkerExpression::String {
        key,
        operator,
        value,
    }))
}

fn parse_extra_expr(
    operator: MarkerOperator,
    value: &str,
    reporter: &mut impl Reporter,
) -> Option<MarkerTree> {
    let Some(operator) = ExtraOperator::from_marker_operator(operator) else {
        reporter.report(
            MarkerWarningKind::ExtraInvalidComparison,
            format!("Comparing extra with '{operator}' is not supported, the clause will be ignored"),
        );
        return None;
    };
    let name = match ExtraName::from_str(value) {
        Ok(extra) => MarkerValueExtra::Extra(extra),
        Err(err) => {
            reporter.report(
                MarkerWarningKind::ExtraInvalidComparison,
                format!("Expected extra name, found '{value}', it will never match: {err}"),
            );
            MarkerValueExtra::Arbitrary(value.to_string())
        }
    };
    Some(MarkerTree::Expression(MarkerExpression::Extra {
        operator,
        name,
    }))
}

/// ```text
/// marker_expr   = marker_var:l marker_op:o marker_var:r -> (o, l, r)
///               | wsp* '(' marker:m wsp* ')' -> m
/// ```
fn parse_marker_expr<R: Reporter>(
    cursor: &mut Cursor,
    reporter: &mut R,
) -> Result<Option<MarkerTree>, Pep508Error> {
    cursor.eat_whitespace();
    if let Some(start_pos) = cursor.eat_char('(') {
        let marker = parse_marker_or(cursor, reporter)?;
        cursor.next_expect_char(')', start_pos)?;
        Ok(marker)
    } else {
        parse_marker_key_op_value(cursor, reporter)
    }
}

/// ```text
/// marker_and    = marker_expr:l wsp* 'and' marker_expr:r -> ('and', l, r)
///               | marker_expr:m -> m
/// ```
fn parse_marker_and<R: Reporter>(
    cursor: &mut Cursor,
    reporter: &mut R,
) -> Result<Option<MarkerTree>, Pep508Error> {
    parse_marker_op(
        cursor,
        "and",
        MarkerTree::conjunction,
        parse_marker_expr,
        reporter,
    )
}

/// ```text
/// marker_or     = marker_and:l wsp* 'or' marker_and:r -> ('or', l, r)
///                   | marker_and:m -> m
/// ```
fn parse_marker_or<R: Reporter>(
    cursor: &mut Cursor,
    reporter: &mut R,
) -> Result<Option<MarkerTree>, Pep508Error> {
    parse_marker_op(
        cursor,
        "or",
        MarkerTree::disjunction,
        parse_marker_and,
        reporter,
    )
}

/// Parses both `marker_and` and `marker_or`. Dropped clauses are left out of the combination; if
/// every clause is dropped, so is the whole group.
fn parse_marker_op<R: Reporter>(
    cursor: &mut Cursor,
    op: &str,
    op_constructor: fn(Vec<MarkerTree>) -> MarkerTree,
    parse_inner: fn(&mut Cursor, &mut R) -> Result<Option<MarkerTree>, Pep508Error>,
    reporter: &mut R,
) -> Result<Option<MarkerTree>, Pep508Error> {
    // marker_and or marker_expr
    let first_element = parse_inner(cursor, reporter)?;
    // wsp*
    cursor.eat_whitespace();
    // Check if we're done here instead of invoking the whole vec allocating loop
    if matches!(cursor.peek_char(), None | Some(')')) {
        return Ok(first_element);
    }

    let mut expressions = Vec::with_capacity(2);
    expressions.extend(first_element);
    loop {
        // wsp*
        cursor.eat_whitespace();
        // ('or' marker_and) or ('and' marker_or)
        match cursor.peek_str(|c| !c.is_whitespace()) {
            (_, value) if value == op => {
                cursor.take_str(|c| !c.is_whitespace());
                let expression = parse_inner(cursor, reporter)?;
                expressions.extend(expression);
            }
            _ => {
                return Ok(if expressions.is_empty() {
                    None
                } else {
                    Some(op_constructor(expressions))
                });
            }
        }
    }
}

/// ```text
/// marker        = marker_or
/// ```
pub(crate) fn parse_markers_cursor(
    cursor: &mut Cursor,
    reporter: &mut impl Reporter,
) -> Result<MarkerTree, Pep508Error> {
    let marker = parse_marker_or(cursor, reporter)?;
    cursor.eat_whitespace();
    if let Some((pos, unexpected)) = cursor.next() {
        // If we're here, both parse_marker_or and parse_marker_and returned because the next
        // character was neither "and" nor "or"
        return Err(cursor.error(
            format!("Unexpected character '{unexpected}', expected 'and', 'or' or end of input"),
            pos,
            unexpected.len_utf8() + cursor.remaining(),
        ));
    }
    // A marker whose clauses were all dropped places no constraint.
    Ok(marker.unwrap_or(MarkerTree::True))
}

/// Parses markers such as `python_version < '3.8'` or
/// `python_version == "3.10" and (sys_platform == "win32" or (os_name == "linux" and implementation_name == 'cpython'))`
pub(crate) fn parse_markers(
    markers: &str,
    reporter: &mut impl Reporter,
) -> Result<MarkerTree, Pep508Error> {
    let mut chars = Cursor::new(markers);
    parse_markers_cursor(&mut chars, reporter)
}
