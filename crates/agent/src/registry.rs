use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parley_core::domain::fragment::FragmentBody;
use parley_core::errors::{ApplicationError, DomainError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Declared contract for one function the completion model may invoke:
/// a name, a description the model reads, and a JSON Schema for the
/// parameters. Built once at startup, immutable afterwards.
#[derive(Clone, Debug, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Result of a dispatched function call: the final render for the UI
/// fragment and the serialized summary appended as a function-role turn.
#[derive(Clone, Debug)]
pub struct CallOutcome {
    pub body: FragmentBody,
    pub transcript_note: String,
}

#[async_trait]
pub trait FunctionHandler: Send + Sync {
    fn spec(&self) -> FunctionSpec;
    async fn invoke(&self, arguments: Value) -> Result<CallOutcome, ApplicationError>;
}

/// Dispatch table keyed by function name. Registration happens once at
/// startup; dispatch rejects unknown names and syntactically malformed
/// arguments before any handler runs.
#[derive(Default)]
pub struct FunctionRegistry {
    handlers: HashMap<String, Arc<dyn FunctionHandler>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: FunctionHandler + 'static,
    {
        self.handlers.insert(handler.spec().name, Arc::new(handler));
    }

    /// The declared specs, sorted by name so request payloads are stable.
    pub fn specs(&self) -> Vec<FunctionSpec> {
        let mut specs: Vec<FunctionSpec> =
            self.handlers.values().map(|handler| handler.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub async fn dispatch(
        &self,
        name: &str,
        raw_arguments: &str,
    ) -> Result<CallOutcome, ApplicationError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| DomainError::UnknownFunction(name.to_string()))?;

        let arguments: Value = serde_json::from_str(raw_arguments).map_err(|error| {
            DomainError::InvalidArguments { function: name.to_string(), reason: error.to_string() }
        })?;

        handler.invoke(arguments).await
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Parse a handler's typed arguments from the value the provider returned.
/// Any missing field, type mismatch, or unknown field rejects the call
/// instead of invoking the handler with partial data.
pub fn parse_arguments<T>(function: &str, arguments: Value) -> Result<T, ApplicationError>
where
    T: DeserializeOwned,
{
    serde_json::from_value(arguments).map_err(|error| {
        DomainError::InvalidArguments { function: function.to_string(), reason: error.to_string() }
            .into()
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parley_core::domain::fragment::FragmentBody;
    use parley_core::errors::{ApplicationError, DomainError};
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::{json, Value};

    use super::{parse_arguments, CallOutcome, FunctionHandler, FunctionRegistry, FunctionSpec};

    #[derive(Debug, Deserialize, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct EchoArgs {
        text: String,
    }

    struct EchoHandler;

    #[async_trait]
    impl FunctionHandler for EchoHandler {
        fn spec(&self) -> FunctionSpec {
            FunctionSpec {
                name: "echo".to_string(),
                description: "Echoes the given text.".to_string(),
                parameters: serde_json::to_value(schemars::schema_for!(EchoArgs))
                    .unwrap_or_default(),
            }
        }

        async fn invoke(&self, arguments: Value) -> Result<CallOutcome, ApplicationError> {
            let args: EchoArgs = parse_arguments("echo", arguments)?;
            Ok(CallOutcome {
                body: FragmentBody::Markdown { text: args.text.clone() },
                transcript_note: format!("[Echoed {}]", args.text),
            })
        }
    }

    fn registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        registry.register(EchoHandler);
        registry
    }

    #[tokio::test]
    async fn dispatch_routes_to_the_named_handler() {
        let outcome = registry()
            .dispatch("echo", r#"{"text":"hello"}"#)
            .await
            .expect("dispatch should succeed");

        assert_eq!(outcome.body, FragmentBody::Markdown { text: "hello".to_string() });
        assert_eq!(outcome.transcript_note, "[Echoed hello]");
    }

    #[tokio::test]
    async fn unknown_function_name_is_rejected() {
        let error = registry().dispatch("sell_stock", "{}").await.expect_err("must fail");
        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::UnknownFunction("sell_stock".to_string()))
        );
    }

    #[tokio::test]
    async fn malformed_argument_json_is_rejected() {
        let error = registry().dispatch("echo", "{not json").await.expect_err("must fail");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::InvalidArguments { ref function, .. })
                if function == "echo"
        ));
    }

    #[tokio::test]
    async fn unknown_fields_fail_closed() {
        let error = registry()
            .dispatch("echo", r#"{"text":"hi","extra":true}"#)
            .await
            .expect_err("must fail");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn specs_are_sorted_by_name() {
        struct OtherHandler;

        #[async_trait]
        impl FunctionHandler for OtherHandler {
            fn spec(&self) -> FunctionSpec {
                FunctionSpec {
                    name: "aardvark".to_string(),
                    description: "First by name.".to_string(),
                    parameters: json!({"type": "object"}),
                }
            }

            async fn invoke(&self, _arguments: Value) -> Result<CallOutcome, ApplicationError> {
                Ok(CallOutcome {
                    body: FragmentBody::Spinner,
                    transcript_note: String::new(),
                })
            }
        }

        let mut registry = registry();
        registry.register(OtherHandler);

        let names: Vec<String> = registry.specs().into_iter().map(|spec| spec.name).collect();
        assert_eq!(names, vec!["aardvark".to_string(), "echo".to_string()]);
    }
}
