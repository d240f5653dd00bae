use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use parley_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let completion_api_key = if config.completion.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "completion.api_key",
        completion_api_key,
        source("completion.api_key", &["PARLEY_COMPLETION_API_KEY", "OPENAI_API_KEY"]),
    ));
    lines.push(render_line(
        "completion.base_url",
        &config.completion.base_url,
        source("completion.base_url", &["PARLEY_COMPLETION_BASE_URL"]),
    ));
    lines.push(render_line(
        "completion.model",
        &config.completion.model,
        source("completion.model", &["PARLEY_COMPLETION_MODEL"]),
    ));
    lines.push(render_line(
        "completion.timeout_secs",
        &config.completion.timeout_secs.to_string(),
        source("completion.timeout_secs", &["PARLEY_COMPLETION_TIMEOUT_SECS"]),
    ));

    let stripe_secret_key = if config.stripe.secret_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "stripe.secret_key",
        stripe_secret_key,
        source("stripe.secret_key", &["PARLEY_STRIPE_SECRET_KEY", "STRIPE_SECRET_KEY"]),
    ));
    lines.push(render_line(
        "stripe.base_url",
        &config.stripe.base_url,
        source("stripe.base_url", &["PARLEY_STRIPE_BASE_URL"]),
    ));
    lines.push(render_line(
        "stripe.timeout_secs",
        &config.stripe.timeout_secs.to_string(),
        source("stripe.timeout_secs", &["PARLEY_STRIPE_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", &["PARLEY_SERVER_BIND_ADDRESS"]),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", &["PARLEY_SERVER_PORT"]),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", &["PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["PARLEY_LOGGING_LEVEL", "PARLEY_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["PARLEY_LOGGING_FORMAT", "PARLEY_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("parley.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/parley.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
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
