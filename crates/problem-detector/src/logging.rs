//! Tracing subscriber setup for the binary.

use clap::ValueEnum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "vsphere_problem_detector=info,problem_detector=info,check_engine=info";
const VERBOSE_FILTER: &str =
    "vsphere_problem_detector=debug,problem_detector=debug,check_engine=debug,info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::new(DEFAULT_FILTER)
    }
}

/// Install the global subscriber. Logs go to stderr so reports on stdout
/// stay machine readable.
pub fn init(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init(),
    }
}
