use std::error::Error;
use std::iter;
use std::sync::atomic::AtomicBool;
use std::sync::{LazyLock, Mutex};

// macro hygiene: The user might not have direct dependencies on those crates
#[doc(hidden)]
pub use anstream;
#[doc(hidden)]
pub use owo_colors;
use owo_colors::{DynColor, OwoColorize};
use rustc_hash::FxHashSet;

/// Whether user-facing warnings are enabled.
pub static ENABLED: AtomicBool = AtomicBool::new(false);

/// Enable user-facing warnings.
pub fn enable() {
    ENABLED.store(true, std::sync::atomic::Ordering::Relaxed);
}

/// Disable user-facing warnings.
pub fn disable() {
    ENABLED.store(false, std::sync::atomic::Ordering::Relaxed);
}

/// Warn a user, if warnings are enabled.
#[macro_export]
macro_rules! warn_user {
    ($($arg:tt)*) => {{
        use $crate::anstream::eprintln;
        use $crate::owo_colors::OwoColorize;

        if $crate::ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            let message = format!("{}", format_args!($($arg)*));
            let formatted = message.bold();
            eprintln!("{}{} {formatted}", "warning".yellow().bold(), ":".bold());
        }
    }};
}

pub static WARNINGS: LazyLock<Mutex<FxHashSet<String>>> = LazyLock::new(Mutex::default);

/// Warn a user once, if warnings are enabled, with uniqueness determined by the content of the
/// message.
#[macro_export]
macro_rules! warn_user_once {
    ($($arg:tt)*) => {{
        use $crate::anstream::eprintln;
        use $crate::owo_colors::OwoColorize;

        if $crate::ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            if let Ok(mut states) = $crate::WARNINGS.lock() {
                let message = format!("{}", format_args!($($arg)*));
                if states.insert(message.clone()) {
                    eprintln!("{}{} {}", "warning".yellow().bold(), ":".bold(), message.bold());
                }
            }
        }
    }};
}

/// Format an error chain, one `Caused by` line per source.
///
/// ```text
/// error: Failed to resolve dependencies
///   Caused by: Failed to fetch the versions of `attrs`
///   Caused by: `attrs` was not found in the package index
/// ```
///
/// Continuation lines of multi-line messages are aligned with the first line of their cause.
pub fn write_error_chain_with_options(
    err: &dyn Error,
    mut stream: impl std::fmt::Write,
    level: impl AsRef<str>,
    color: impl DynColor + Copy,
) -> std::fmt::Result {
    writeln!(
        &mut stream,
        "{}{} {}",
        level.as_ref().color(color).bold(),
        ":".bold(),
        err.to_string().trim()
    )?;

    let padding = "  ";
    let cause = "Caused by";
    let child_padding = " ".repeat(padding.len() + cause.len() + 2);
    for source in iter::successors(err.source(), |&err| err.source()) {
        let message = source.to_string();
        let mut lines = message.lines();
        let Some(first) = lines.next() else {
            continue;
        };
        writeln!(
            &mut stream,
            "{padding}{}: {}",
            cause.color(color).bold(),
            first.trim()
        )?;
        for line in lines {
            let line = line.trim_end();
            if line.is_empty() {
                // Avoid showing indents on empty lines
                writeln!(&mut stream)?;
            } else {
                writeln!(&mut stream, "{child_padding}{line}")?;
            }
        }
    }
    Ok(())
}

/// Format an error chain at the error level, in red.
pub fn write_error_chain(err: &dyn Error, stream: impl std::fmt::Write) -> std::fmt::Result {
    write_error_chain_with_options(err, stream, "error", owo_colors::AnsiColors::Red)
}

/// Format a warning chain at the warning level, in yellow.
pub fn write_warning_chain(err: &dyn Error, stream: impl std::fmt::Write) -> std::fmt::Result {
    write_error_chain_with_options(err, stream, "warning", owo_colors::AnsiColors::Yellow)
}
