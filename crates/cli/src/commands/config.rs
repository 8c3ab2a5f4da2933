use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use outlay_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

/// Effective configuration with the source of every value. The ledger signing key is never
/// printed.
pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let sources =
        Sources { file_doc: config_file_doc.as_ref(), file_path: config_file_path.as_deref() };

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    lines.push(render_line(
        "database.url",
        &config.database.url,
        sources.of(
            "database.url",
            &["OUTLAY_DATABASE_URL"],
            options.overrides.database_url.is_some(),
        ),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        sources.of("database.max_connections", &["OUTLAY_DATABASE_MAX_CONNECTIONS"], false),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        sources.of("database.timeout_secs", &["OUTLAY_DATABASE_TIMEOUT_SECS"], false),
    ));
    lines.push(render_line(
        "ledger.signing_key",
        "<redacted>",
        sources.of(
            "ledger.signing_key",
            &["OUTLAY_LEDGER_SIGNING_KEY"],
            options.overrides.ledger_signing_key.is_some(),
        ),
    ));
    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        sources.of(
            "logging.level",
            &["OUTLAY_LOGGING_LEVEL", "OUTLAY_LOG_LEVEL"],
            options.overrides.log_level.is_some(),
        ),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        sources.of(
            "logging.format",
            &["OUTLAY_LOGGING_FORMAT", "OUTLAY_LOG_FORMAT"],
            options.overrides.log_format.is_some(),
        ),
    ));

    CommandResult::success("config", lines.join("\n"))
}

struct Sources<'a> {
    file_doc: Option<&'a Value>,
    file_path: Option<&'a Path>,
}

impl Sources<'_> {
    fn of(&self, key_path: &str, env_keys: &[&str], overridden: bool) -> String {
        if overridden {
            return "flag".to_string();
        }

        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    if let Some(path) = env::var_os("OUTLAY_CONFIG").map(PathBuf::from) {
        return path.exists().then_some(path);
    }

    ["outlay.toml", "config/outlay.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
