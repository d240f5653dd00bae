use std::sync::Arc;

use parley_agent::completion::OpenAiCompletionClient;
use parley_agent::handlers::default_registry;
use parley_agent::prompt::system_prompt;
use parley_agent::session::ChatSession;
use parley_core::config::{AppConfig, LoadOptions};
use parley_core::domain::fragment::{FragmentBody, UiFragment};
use parley_core::errors::{ApplicationError, DomainError};
use parley_stripe::StripeClient;

use super::CommandResult;

pub fn run(message: &str, json_output: bool) -> CommandResult {
    if message.trim().is_empty() {
        return CommandResult::failure("chat", "empty_message", "message must not be empty", 2);
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", error.to_string(), 2)
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            )
        }
    };

    match runtime.block_on(run_turn(&config, message)) {
        Ok(fragment) => {
            let output = if json_output {
                serde_json::to_string_pretty(&fragment)
                    .unwrap_or_else(|error| format!("fragment serialization failed: {error}"))
            } else {
                render_fragment(&fragment)
            };
            CommandResult { exit_code: 0, output }
        }
        Err(error) => CommandResult::failure("chat", "turn_failed", error.to_string(), 1),
    }
}

async fn run_turn(config: &AppConfig, message: &str) -> Result<UiFragment, ApplicationError> {
    let completion = Arc::new(OpenAiCompletionClient::new(&config.completion)?);
    let stripe = Arc::new(StripeClient::new(&config.stripe)?);
    let registry = Arc::new(default_registry(stripe));

    let mut session = ChatSession::new(
        config.completion.model.clone(),
        system_prompt(),
        completion,
        registry,
    );

    let receipt = session.submit_message(message).await?;
    session.fragment(receipt.fragment_id).cloned().ok_or_else(|| {
        DomainError::InvariantViolation("turn completed without a fragment".to_string()).into()
    })
}

fn render_fragment(fragment: &UiFragment) -> String {
    match &fragment.body {
        FragmentBody::Markdown { text } => text.clone(),
        FragmentBody::Spinner => "(pending)".to_string(),
        FragmentBody::Skeleton { label } => format!("(loading {label})"),
        FragmentBody::CustomerList { customers } => {
            if customers.is_empty() {
                return "no matching customers".to_string();
            }
            let mut lines = vec![format!("{} customers:", customers.len())];
            for record in customers {
                lines.push(format!(
                    "- {} <{}>",
                    record.name.as_deref().unwrap_or("(no name)"),
                    record.email.as_deref().unwrap_or("(no email)"),
                ));
            }
            lines.join("\n")
        }
        FragmentBody::ProductList { products } => {
            if products.is_empty() {
                return "no matching products".to_string();
            }
            let mut lines = vec![format!("{} products:", products.len())];
            for record in products {
                lines.push(format!("- {} (${} each)", record.name, record.unit_price));
            }
            lines.join("\n")
        }
    }
}
