//! Tracing setup for the `chatter` binary.

use shared::config::{Config, LogFormat};
use tracing::{Subscriber, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt, fmt::MakeWriter};

/// Installs the global subscriber. Logs go to stderr; stdout belongs to the console.
///
/// Returns the configured level. `RUST_LOG` takes precedence when set.
pub fn initialize_tracing(config: &Config) -> String {
    let subscriber = build_subscriber(config, std::io::stderr, true);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("tracing subscriber already installed");
    }

    config.log_level.clone()
}

fn build_subscriber<W>(config: &Config, writer: W, ansi: bool) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let builder = fmt::fmt()
        .with_env_filter(build_env_filter(config))
        .with_writer(writer)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    match config.log_format {
        LogFormat::Json => Box::new(builder.json().with_ansi(false).finish()),
        LogFormat::Text => Box::new(builder.with_ansi(ansi).finish()),
    }
}

fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}
