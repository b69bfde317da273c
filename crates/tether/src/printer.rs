use std::fmt::Write;
use std::path::Path;

use anstream::{eprint, print};
use owo_colors::OwoColorize;

use tether_fs::Simplified;

/// Routes the user-facing output of a command.
///
/// Status lines (progress summaries, change lists, failures the user is expected to act on) go
/// to stderr. The only result written to stdout is the `tree` rendering. `--quiet` silences
/// both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Printer {
    quiet: bool,
}

impl Printer {
    pub(crate) fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    /// The stream for status lines.
    pub(crate) fn status(self) -> Stream {
        if self.quiet {
            Stream::Sink
        } else {
            Stream::Stderr
        }
    }

    /// The stream for a command's result.
    pub(crate) fn result(self) -> Stream {
        if self.quiet {
            Stream::Sink
        } else {
            Stream::Stdout
        }
    }

    /// Report an expected failure, such as an unsatisfiable resolution or a hash mismatch.
    pub(crate) fn failure(self, err: impl std::fmt::Display) -> std::fmt::Result {
        writeln!(self.status(), "{}: {err}", "error".red().bold())
    }

    /// Report that a command needs a lock file that doesn't exist yet.
    pub(crate) fn missing_lock(self, path: &Path) -> std::fmt::Result {
        writeln!(
            self.status(),
            "{}",
            format!(
                "No lock file found at `{}`. To create one, run `tether lock`.",
                path.user_display()
            )
            .bold()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
    Sink,
}

impl Write for Stream {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        match self {
            #[allow(clippy::print_stdout)]
            Self::Stdout => print!("{s}"),
            #[allow(clippy::print_stderr)]
            Self::Stderr => eprint!("{s}"),
            Self::Sink => {}
        }
        Ok(())
    }
}

/// `count` followed by `noun`, pluralized with an `s` unless the count is one.
pub(crate) fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::{Printer, Stream, plural};

    #[test]
    fn quiet_silences_both_streams() {
        let printer = Printer::new(false);
        assert_eq!(printer.status(), Stream::Stderr);
        assert_eq!(printer.result(), Stream::Stdout);

        let printer = Printer::new(true);
        assert_eq!(printer.status(), Stream::Sink);
        assert_eq!(printer.result(), Stream::Sink);
    }

    #[test]
    fn pluralize() {
        assert_eq!(plural(0, "package"), "0 packages");
        assert_eq!(plural(1, "locked file"), "1 locked file");
        assert_eq!(plural(4, "artifact"), "4 artifacts");
    }
}
