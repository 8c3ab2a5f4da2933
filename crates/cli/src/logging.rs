use outlay_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Output goes to stderr so stdout carries only the JSON
/// command payload. `RUST_LOG` takes precedence over the configured level. An invalid config
/// leaves logging off; the command itself reports the config error.
pub fn init(options: &LoadOptions) {
    let Ok(config) = AppConfig::load(options.clone()) else {
        return;
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(error) = installed {
        eprintln!("logging was already initialized: {error}");
    }
}
