use std::process::ExitCode;

use anstream::eprintln;
use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;

use crate::cli::{Cli, Commands, TreeArgs, VerifyArgs};
use crate::commands::ExitStatus;
use crate::project::Project;
use crate::settings::LockSettings;

mod cli;
mod commands;
mod logging;
mod printer;
mod project;
mod settings;

async fn run(cli: Cli) -> Result<ExitStatus> {
    // Configure the `tracing` crate, which controls internal logging.
    logging::setup_logging(logging::Level::from_verbosity(cli.global_args.verbose))?;

    // Configure the `Printer`, which controls user-facing output in the CLI.
    let printer = printer::Printer::new(cli.global_args.quiet);

    // Configure the `warn_user!` macros, which control user-facing warnings in the CLI.
    if !cli.global_args.quiet {
        tether_warnings::enable();
    }

    anstream::ColorChoice::write_global(cli.global_args.color.into());

    let project_dir = match cli.global_args.project {
        Some(project_dir) => project_dir,
        None => std::env::current_dir().context("Failed to determine the current directory")?,
    };
    let project = Project::discover(&project_dir)?;

    match cli.command {
        Commands::Lock(args) => {
            let settings = LockSettings::resolve(args, &project)?;
            commands::lock(&project, settings, printer).await
        }
        Commands::Check => commands::check(&project, printer).await,
        Commands::Verify(VerifyArgs {
            index_args,
            artifacts,
        }) => {
            let index = settings::index_path(index_args, &project)?;
            commands::verify(&project, &index, artifacts.as_deref(), printer).await
        }
        Commands::Tree(TreeArgs { depth }) => commands::tree(&project, depth, printer).await,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // The resolver's futures aren't `Send`; they're driven by `block_on` on this thread.
    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build the async runtime")
        .and_then(|runtime| runtime.block_on(run(cli)));

    match result {
        Ok(code) => code.into(),
        Err(err) => {
            let mut causes = err.chain();
            if let Some(cause) = causes.next() {
                eprintln!("{}: {}", "error".red().bold(), cause);
            }
            for err in causes {
                eprintln!("  {}: {}", "Caused by".red().bold(), err);
            }
            ExitStatus::Error.into()
        }
    }
}
