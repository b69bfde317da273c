use std::fmt;
use std::str::FromStr;

use anstream::ColorChoice;
use anyhow::Context;
use owo_colors::OwoColorize;
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::{Directive, LevelFilter, ParseError};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_tree::HierarchicalLayer;
use tracing_tree::time::Uptime;

/// How much of the internal `tracing` output to show. `RUST_LOG` overrides each default.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    /// Nothing.
    #[default]
    Default,
    /// Resolver decisions, backtracks, prefetches and lock file reads and writes (`-v`).
    Verbose,
    /// Every candidate the search considers, as a span tree with uptimes (`-vv`).
    ExtraVerbose,
}

impl Level {
    pub(crate) fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => Self::Default,
            1 => Self::Verbose,
            _ => Self::ExtraVerbose,
        }
    }

    /// The filter used when `RUST_LOG` is unset. The `tether` target prefix covers every
    /// `tether_*` crate.
    fn default_directive(self) -> Result<Directive, ParseError> {
        match self {
            Self::Default => Ok(LevelFilter::OFF.into()),
            Self::Verbose => Directive::from_str("tether=debug"),
            Self::ExtraVerbose => Directive::from_str("tether=trace"),
        }
    }
}

/// The workspace component that emitted an event: `tether_resolver::resolver` → `resolver`.
fn component(target: &str) -> &str {
    let krate = target.split("::").next().unwrap_or(target);
    krate.strip_prefix("tether_").unwrap_or(krate)
}

/// Formats `-v` output as `LEVEL component: message`.
struct TetherFormat {
    ansi: bool,
}

impl<S, N> FormatEvent<S, N> for TetherFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let level = *meta.level();
        let component = component(meta.target());

        if self.ansi {
            match level {
                tracing::Level::TRACE => write!(writer, "{} ", level.purple())?,
                tracing::Level::DEBUG => write!(writer, "{} ", level.blue())?,
                tracing::Level::INFO => write!(writer, "{} ", level.green())?,
                tracing::Level::WARN => write!(writer, "{} ", level.yellow())?,
                tracing::Level::ERROR => write!(writer, "{} ", level.red())?,
            }
            write!(writer, "{}: ", component.dimmed())?;
        } else {
            write!(writer, "{level} {component}: ")?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the global `tracing` subscriber, writing to stderr.
pub(crate) fn setup_logging(level: Level) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.default_directive()?)
        .from_env()
        .context("Invalid RUST_LOG directives")?;

    if level == Level::ExtraVerbose {
        tracing_subscriber::registry()
            .with(
                HierarchicalLayer::default()
                    .with_targets(true)
                    .with_timer(Uptime::default())
                    .with_writer(std::io::stderr)
                    .with_filter(filter),
            )
            .init();
        return Ok(());
    }

    // `anstream` resolves `--color` and the terminal into a concrete choice.
    let ansi = matches!(
        anstream::Stderr::choice(&std::io::stderr()),
        ColorChoice::Always | ColorChoice::AlwaysAnsi
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(TetherFormat { ansi })
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_filter(filter),
        )
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Level, component};

    #[test]
    fn verbosity() {
        assert_eq!(Level::from_verbosity(0), Level::Default);
        assert_eq!(Level::from_verbosity(1), Level::Verbose);
        assert_eq!(Level::from_verbosity(3), Level::ExtraVerbose);
    }

    #[test]
    fn directives() {
        let directive = |level: Level| level.default_directive().unwrap().to_string();
        assert_eq!(directive(Level::Default), "off");
        assert_eq!(directive(Level::Verbose), "tether=debug");
        assert_eq!(directive(Level::ExtraVerbose), "tether=trace");
    }

    #[test]
    fn components() {
        assert_eq!(component("tether_resolver::resolver::batch_prefetch"), "resolver");
        assert_eq!(component("tether_lock::commit"), "lock");
        assert_eq!(component("tether::commands::lock"), "tether");
    }
}
