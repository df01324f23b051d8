//! Tracing setup shared by all binaries.

use std::env;

use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

// ---

/// Install the compact fmt subscriber every binary logs through.
///
/// Records carry their target and source location. `RUST_LOG` takes
/// precedence as a full filter directive; without it the base level comes
/// from `SENSORLOOP_LOG_LEVEL` (default `debug`) while sqlx query logging
/// stays at `warn`.
///
/// `SENSORLOOP_SPAN_EVENTS=full` also reports span entry and exit, and
/// `enter_exit` reports entry and exit without the closing summary. ANSI
/// colour follows stdout's TTY status unless `FORCE_COLOR` is set to a
/// yes/no value.
///
/// Panics if a global subscriber is already installed.
pub fn init_tracing() {
    // ---
    let span_events = match env::var("SENSORLOOP_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to SENSORLOOP_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("SENSORLOOP_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
