//! # Logging
//!
//! `tracing` setup for `linkchain-node`. Every event is written to stderr,
//! because `get`, `print` and `validate` put their JSON on stdout.
//!
//! The filter comes from `RUST_LOG` when it is set. Otherwise each command
//! picks a default: `serve` logs requests, `init` and `add` report what they
//! wrote, and read-only commands stay quiet unless something goes wrong.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Colored, with source locations.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Which kind of command is running, for picking a default filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Long-running server: chain events plus HTTP request traces.
    Server,
    /// Commands that write to the chain.
    Writer,
    /// Commands that only read it.
    Reader,
}

impl Verbosity {
    /// Filter directives used when `RUST_LOG` is unset.
    pub fn default_directives(self) -> &'static str {
        match self {
            Verbosity::Server => "linkchain_node=info,linkchain_protocol=info,tower_http=debug",
            Verbosity::Writer => "linkchain_node=info,linkchain_protocol=info",
            Verbosity::Reader => "linkchain_node=warn,linkchain_protocol=warn",
        }
    }
}

/// Install the global subscriber. Panics if one is already installed.
pub fn init_logging(verbosity: Verbosity, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_directives()));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }

    tracing::debug!(?verbosity, ?format, "logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!(LogFormat::from_str("JSON", true), Ok(LogFormat::Json));
        assert_eq!(LogFormat::from_str("pretty", true), Ok(LogFormat::Pretty));
        assert!(LogFormat::from_str("xml", true).is_err());
    }

    #[test]
    fn readers_are_quieter_than_writers() {
        assert!(Verbosity::Reader.default_directives().contains("=warn"));
        assert!(Verbosity::Writer.default_directives().contains("linkchain_protocol=info"));
        assert!(Verbosity::Server.default_directives().contains("tower_http"));
    }

    #[test]
    fn default_directives_parse() {
        for v in [Verbosity::Server, Verbosity::Writer, Verbosity::Reader] {
            assert!(EnvFilter::try_new(v.default_directives()).is_ok());
        }
    }
}
