use std::sync::Arc;

use parley_agent::completion::OpenAiCompletionClient;
use parley_agent::handlers::default_registry;
use parley_core::config::{AppConfig, ConfigError, LoadOptions};
use parley_core::errors::ApplicationError;
use parley_stripe::StripeClient;
use thiserror::Error;
use tracing::info;

use crate::chat::ChatState;

pub struct Application {
    pub config: AppConfig,
    pub chat_state: ChatState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("provider client construction failed: {0}")]
    Client(#[from] ApplicationError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let completion = Arc::new(OpenAiCompletionClient::new(&config.completion)?);
    info!(
        event_name = "system.bootstrap.completion_client_ready",
        correlation_id = "bootstrap",
        model = %config.completion.model,
        "completion client constructed"
    );

    let stripe = Arc::new(StripeClient::new(&config.stripe)?);
    let registry = Arc::new(default_registry(stripe));
    info!(
        event_name = "system.bootstrap.registry_ready",
        correlation_id = "bootstrap",
        functions = registry.len(),
        "function registry constructed"
    );

    let chat_state = ChatState::new(config.completion.model.clone(), completion, registry);
    Ok(Application { config, chat_state })
}

#[cfg(test)]
mod tests {
    use parley_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn valid_overrides() -> ConfigOverrides {
        ConfigOverrides {
            completion_api_key: Some("sk-test".to_string()),
            stripe_secret_key: Some("sk_test_valid".to_string()),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn bootstrap_fails_fast_with_a_publishable_stripe_key() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                stripe_secret_key: Some("pk_test_wrong_kind".to_string()),
                ..valid_overrides()
            },
            ..LoadOptions::default()
        });

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("stripe.secret_key"));
    }

    #[test]
    fn bootstrap_constructs_clients_from_valid_overrides() {
        let app = bootstrap(LoadOptions {
            overrides: valid_overrides(),
            ..LoadOptions::default()
        })
        .expect("bootstrap should succeed with valid overrides");

        assert_eq!(app.config.completion.model, "gpt-3.5-turbo");
        assert_eq!(app.config.server.port, 8080);
    }
}
