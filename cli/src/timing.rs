//! Log and latency output for the CLI.
//!
//! Provider operations are `#[instrument]`ed in the browser crate; with
//! `--timing` each span's duration is logged when it closes, so a slow page
//! fetch or SAS resolution shows up on stderr next to the command's output.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Initialize the global subscriber, writing to stderr.
///
/// `verbose` enables DEBUG, which includes every backend page fetch. `timing`
/// needs at least INFO because span close events are logged at that level.
/// `RUST_LOG` still overrides both.
pub fn init_tracing(verbose: bool, timing: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else if timing {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let span_events = if timing {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_level(true)
                .with_span_events(span_events)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}
