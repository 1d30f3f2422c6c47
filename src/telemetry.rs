//! Tracing setup for verification runs

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a global subscriber: `RUST_LOG` filter (default `info`) and a fmt layer on
/// stdout, JSON when `json` is set.
///
/// Safe to call more than once; only the first call installs anything. Returns whether
/// this call installed the subscriber.
pub fn init_tracing(json: bool) -> bool {
    subscriber(json, std::io::stdout).try_init().is_ok()
}

fn subscriber<W>(json: bool, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Clone + Send + Sync + 'static,
{
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| {
            fmt::layer()
                .json()
                .with_target(true)
                .with_writer(writer.clone())
        }))
        .with((!json).then(|| fmt::layer().with_target(true).with_writer(writer)))
}
