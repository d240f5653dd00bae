use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub completion: CompletionConfig,
    pub stripe: StripeConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Connection settings for the chat-completion provider. The sampling
/// temperature is not configurable: the orchestrator always pins 0.
#[derive(Clone, Debug)]
pub struct CompletionConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: Option<SecretString>,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub completion_api_key: Option<String>,
    pub completion_base_url: Option<String>,
    pub completion_model: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_base_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            completion: CompletionConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-3.5-turbo".to_string(),
                timeout_secs: 60,
            },
            stripe: StripeConfig {
                secret_key: None,
                base_url: "https://api.stripe.com".to_string(),
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parley.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(completion) = patch.completion {
            if let Some(completion_api_key_value) = completion.api_key {
                self.completion.api_key = Some(secret_value(completion_api_key_value));
            }
            if let Some(base_url) = completion.base_url {
                self.completion.base_url = base_url;
            }
            if let Some(model) = completion.model {
                self.completion.model = model;
            }
            if let Some(timeout_secs) = completion.timeout_secs {
                self.completion.timeout_secs = timeout_secs;
            }
        }

        if let Some(stripe) = patch.stripe {
            if let Some(stripe_secret_key_value) = stripe.secret_key {
                self.stripe.secret_key = Some(secret_value(stripe_secret_key_value));
            }
            if let Some(base_url) = stripe.base_url {
                self.stripe.base_url = base_url;
            }
            if let Some(timeout_secs) = stripe.timeout_secs {
                self.stripe.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // Provider-native variable names are honored as fallbacks so the
        // keys can be supplied the same way the upstream SDKs expect them.
        let completion_key =
            read_env("PARLEY_COMPLETION_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = completion_key {
            self.completion.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARLEY_COMPLETION_BASE_URL") {
            self.completion.base_url = value;
        }
        if let Some(value) = read_env("PARLEY_COMPLETION_MODEL") {
            self.completion.model = value;
        }
        if let Some(value) = read_env("PARLEY_COMPLETION_TIMEOUT_SECS") {
            self.completion.timeout_secs = parse_u64("PARLEY_COMPLETION_TIMEOUT_SECS", &value)?;
        }

        let stripe_key =
            read_env("PARLEY_STRIPE_SECRET_KEY").or_else(|| read_env("STRIPE_SECRET_KEY"));
        if let Some(value) = stripe_key {
            self.stripe.secret_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARLEY_STRIPE_BASE_URL") {
            self.stripe.base_url = value;
        }
        if let Some(value) = read_env("PARLEY_STRIPE_TIMEOUT_SECS") {
            self.stripe.timeout_secs = parse_u64("PARLEY_STRIPE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PARLEY_SERVER_PORT") {
            self.server.port = parse_u16("PARLEY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("PARLEY_LOGGING_LEVEL").or_else(|| read_env("PARLEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARLEY_LOGGING_FORMAT").or_else(|| read_env("PARLEY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(completion_api_key) = overrides.completion_api_key {
            self.completion.api_key = Some(secret_value(completion_api_key));
        }
        if let Some(completion_base_url) = overrides.completion_base_url {
            self.completion.base_url = completion_base_url;
        }
        if let Some(completion_model) = overrides.completion_model {
            self.completion.model = completion_model;
        }
        if let Some(stripe_secret_key) = overrides.stripe_secret_key {
            self.stripe.secret_key = Some(secret_value(stripe_secret_key));
        }
        if let Some(stripe_base_url) = overrides.stripe_base_url {
            self.stripe.base_url = stripe_base_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_completion(&self.completion)?;
        validate_stripe(&self.stripe)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_completion(completion: &CompletionConfig) -> Result<(), ConfigError> {
    let key = completion
        .api_key
        .as_ref()
        .map(|value| value.expose_secret().trim().to_string())
        .unwrap_or_default();
    if key.is_empty() {
        return Err(ConfigError::Validation(
            "completion.api_key is required. Set PARLEY_COMPLETION_API_KEY or OPENAI_API_KEY"
                .to_string(),
        ));
    }

    if !is_http_url(&completion.base_url) {
        return Err(ConfigError::Validation(
            "completion.base_url must start with http:// or https://".to_string(),
        ));
    }

    if completion.model.trim().is_empty() {
        return Err(ConfigError::Validation("completion.model must not be empty".to_string()));
    }

    if completion.timeout_secs == 0 || completion.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "completion.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_stripe(stripe: &StripeConfig) -> Result<(), ConfigError> {
    let key = stripe
        .secret_key
        .as_ref()
        .map(|value| value.expose_secret().trim().to_string())
        .unwrap_or_default();
    if key.is_empty() {
        return Err(ConfigError::Validation(
            "stripe.secret_key is required. Set PARLEY_STRIPE_SECRET_KEY or STRIPE_SECRET_KEY"
                .to_string(),
        ));
    }
    if !key.starts_with("sk_") && !key.starts_with("rk_") {
        let hint = if key.starts_with("pk_") {
            " (hint: you may have used the publishable key instead of the secret key)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "stripe.secret_key must start with `sk_` or `rk_`{hint}. Get it from the Stripe dashboard under Developers > API keys"
        )));
    }

    if !is_http_url(&stripe.base_url) {
        return Err(ConfigError::Validation(
            "stripe.base_url must start with http:// or https://".to_string(),
        ));
    }

    if stripe.timeout_secs == 0 || stripe.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "stripe.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    completion: Option<CompletionPatch>,
    stripe: Option<StripePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StripePatch {
    secret_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
