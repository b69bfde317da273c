use std::error::Error;
use std::fmt::{Display, Formatter};

pub use extra_name::ExtraName;
pub use package_name::PackageName;

mod extra_name;
mod package_name;

/// Validate and normalize an owned package or extra name, reusing the allocation when the input
/// is already in normal form.
pub(crate) fn validate_and_normalize_owned(name: String) -> Result<String, InvalidNameError> {
    if is_normalized(&name)? {
        Ok(name)
    } else {
        validate_and_normalize_ref(name)
    }
}

/// Validate and normalize a borrowed package or extra name.
pub(crate) fn validate_and_normalize_ref(
    name: impl AsRef<str>,
) -> Result<String, InvalidNameError> {
    let name = name.as_ref();
    let mut normalized = String::with_capacity(name.len());

    let mut previous = None;
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' => normalized.push(byte.to_ascii_lowercase() as char),
            b'a'..=b'z' | b'0'..=b'9' => normalized.push(byte as char),
            b'-' | b'_' | b'.' => match previous {
                // Leading separator.
                None => return Err(InvalidNameError(name.to_string())),
                Some(b'-' | b'_' | b'.') => {}
                Some(_) => normalized.push('-'),
            },
            _ => return Err(InvalidNameError(name.to_string())),
        }
        previous = Some(byte);
    }

    if matches!(previous, None | Some(b'-' | b'_' | b'.')) {
        return Err(InvalidNameError(name.to_string()));
    }

    Ok(normalized)
}

/// Returns `true` if the name is already lowercase with single `-` separators.
fn is_normalized(name: impl AsRef<str>) -> Result<bool, InvalidNameError> {
    let name = name.as_ref();
    let mut previous = None;
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'_' | b'.' => return Ok(false),
            b'a'..=b'z' | b'0'..=b'9' => {}
            b'-' => match previous {
                None => return Err(InvalidNameError(name.to_string())),
                Some(b'-') => return Ok(false),
                Some(_) => {}
            },
            _ => return Err(InvalidNameError(name.to_string())),
        }
        previous = Some(byte);
    }

    if matches!(previous, None | Some(b'-')) {
        return Err(InvalidNameError(name.to_string()));
    }

    Ok(true)
}

/// Invalid [`crate::PackageName`] or [`crate::ExtraName`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidNameError(String);

impl InvalidNameError {
    /// Returns the invalid name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Not a valid package or extra name: \"{}\". Names must start and end with a letter or \
            digit and may only contain -, _, ., and alphanumeric characters.",
            self.0
        )
    }
}

impl Error for InvalidNameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize() {
        let inputs = [
            "friendly-bard",
            "Friendly-Bard",
            "FRIENDLY-BARD",
            "friendly.bard",
            "friendly_bard",
            "friendly--bard",
            "friendly-.bard",
            "FrIeNdLy-._.-bArD",
        ];
        for input in inputs {
            assert_eq!(
                validate_and_normalize_ref(input).unwrap(),
                "friendly-bard",
                "{input}"
            );
            assert_eq!(
                validate_and_normalize_owned(input.to_string()).unwrap(),
                "friendly-bard",
                "{input}"
            );
        }
    }

    #[test]
    fn check() {
        assert!(is_normalized("markdown-it-py").unwrap());
        assert!(is_normalized("attrs").unwrap());
        assert!(!is_normalized("markdown_it_py").unwrap());
        assert!(!is_normalized("Markdown-It-Py").unwrap());
        assert!(!is_normalized("markdown--it").unwrap());
    }

    #[test]
    fn unchanged() {
        let unchanged = ["friendly-bard", "1okay", "okay2"];
        for input in unchanged {
            assert_eq!(validate_and_normalize_ref(input).unwrap(), input);
        }
    }

    #[test]
    fn failures() {
        let failures = [
            "",
            " starts-with-space",
            "-starts-with-dash",
            "ends-with-dash-",
            "ends-with-space ",
            "includes!invalid-char",
            "space in middle",
            "alpha-α",
        ];
        for input in failures {
            assert!(validate_and_normalize_ref(input).is_err(), "{input}");
            assert!(is_normalized(input).is_err(), "{input}");
        }
    }
}
