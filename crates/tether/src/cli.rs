use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use tether_normalize::PackageName;
use tether_resolver::{PrereleaseMode, ResolutionMode};

#[derive(Parser)]
#[command(name = "tether", author, version, about)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,

    #[command(flatten)]
    pub(crate) global_args: GlobalArgs,
}

#[derive(Args)]
pub(crate) struct GlobalArgs {
    /// Do not print any output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    pub(crate) quiet: bool,

    /// Use verbose output.
    ///
    /// Repeat (`-vv`) to show the span tree of the resolution.
    #[arg(global = true, action = clap::ArgAction::Count, long, short, conflicts_with = "quiet")]
    pub(crate) verbose: u8,

    /// Control colors in output.
    #[arg(global = true, long, value_enum, default_value = "auto")]
    pub(crate) color: ColorChoice,

    /// The project directory, containing `tether.toml`.
    ///
    /// Defaults to the current directory.
    #[arg(global = true, long, env = "TETHER_PROJECT", value_name = "DIR")]
    pub(crate) project: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub(crate) enum ColorChoice {
    /// Enables colored output only when the output is going to a terminal or TTY with support.
    Auto,

    /// Enables colored output regardless of the detected environment.
    Always,

    /// Disables colored output.
    Never,
}

impl From<ColorChoice> for anstream::ColorChoice {
    fn from(value: ColorChoice) -> Self {
        match value {
            ColorChoice::Auto => Self::Auto,
            ColorChoice::Always => Self::Always,
            ColorChoice::Never => Self::Never,
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Resolve the project requirements into `tether.lock`.
    Lock(LockArgs),
    /// Check that `tether.lock` is up to date with the project requirements.
    Check,
    /// Verify the locked file hashes against the package index.
    Verify(VerifyArgs),
    /// Display the locked dependency tree.
    Tree(TreeArgs),
}

#[derive(Args)]
pub(crate) struct IndexArgs {
    /// The package index: a JSON file mapping package names to their published versions.
    ///
    /// Relative paths are resolved against the current directory. Defaults to the `index` in
    /// `[tool.tether]`.
    #[arg(long, env = "TETHER_INDEX", value_name = "FILE")]
    pub(crate) index: Option<PathBuf>,
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct LockArgs {
    #[command(flatten)]
    pub(crate) index_args: IndexArgs,

    /// The strategy to use when selecting between the different compatible versions for a given
    /// package requirement.
    #[arg(long, value_enum, env = "TETHER_RESOLUTION")]
    pub(crate) resolution: Option<ResolutionMode>,

    /// The strategy to use when considering pre-release versions.
    #[arg(long, value_enum, env = "TETHER_PRERELEASE")]
    pub(crate) prerelease: Option<PrereleaseMode>,

    /// Resolve for a single environment, described by a JSON file with the PEP 508 marker values.
    ///
    /// By default, the lock serves every platform and every Python version the project supports.
    #[arg(long, env = "TETHER_TARGET", value_name = "FILE")]
    pub(crate) target: Option<PathBuf>,

    /// Allow package upgrades, ignoring the versions in the existing lock file.
    #[arg(long, short = 'U')]
    pub(crate) upgrade: bool,

    /// Allow upgrades for a specific package, ignoring its version in the existing lock file.
    #[arg(long, short = 'P', value_name = "PACKAGE")]
    pub(crate) upgrade_package: Vec<PackageName>,

    /// Assert that `tether.lock` is up to date with the project requirements.
    ///
    /// Fails instead of updating the lock file when it is missing or stale.
    #[arg(long, conflicts_with_all = ["dry_run", "upgrade", "upgrade_package"])]
    pub(crate) locked: bool,

    /// Perform a dry run, without writing the lock file.
    ///
    /// Reports the changes that would be made instead.
    #[arg(long)]
    pub(crate) dry_run: bool,
}

#[derive(Args)]
pub(crate) struct VerifyArgs {
    #[command(flatten)]
    pub(crate) index_args: IndexArgs,

    /// Also check the distribution files found in this directory against their locked hashes.
    #[arg(long, value_name = "DIR")]
    pub(crate) artifacts: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct TreeArgs {
    /// Maximum display depth of the dependency tree.
    #[arg(long, short, default_value_t = 255)]
    pub(crate) depth: u8,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Commands};

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn lock_flags() {
        let cli = Cli::try_parse_from([
            "tether",
            "lock",
            "--upgrade-package",
            "attrs",
            "-P",
            "Mdit_Py_Plugins",
            "--resolution",
            "lowest-direct",
            "-vv",
        ])
        .unwrap();
        let Commands::Lock(args) = cli.command else {
            panic!("expected `lock`");
        };
        let names: Vec<String> = args
            .upgrade_package
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(names, ["attrs", "mdit-py-plugins"]);
        assert_eq!(cli.global_args.verbose, 2);

        assert!(Cli::try_parse_from(["tether", "lock", "--locked", "--upgrade"]).is_err());
        assert!(Cli::try_parse_from(["tether", "-q", "-v", "check"]).is_err());
    }
}
