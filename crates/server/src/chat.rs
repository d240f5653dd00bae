//! The UI boundary: submit a user message to a conversation and read back
//! the conversation's renderable fragments.
//!
//! Sessions are owned per conversation and live for the lifetime of the
//! process. Each conversation sits behind its own async lock so at most one
//! turn is in flight against it; concurrent submissions to the same
//! conversation queue up instead of interleaving.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use parley_agent::completion::CompletionClient;
use parley_agent::prompt::system_prompt;
use parley_agent::registry::FunctionRegistry;
use parley_agent::session::ChatSession;
use parley_core::domain::fragment::UiFragment;
use parley_core::errors::InterfaceError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

type SessionMap = HashMap<String, Arc<Mutex<ChatSession>>>;

#[derive(Clone)]
pub struct ChatState {
    model: String,
    completion: Arc<dyn CompletionClient>,
    registry: Arc<FunctionRegistry>,
    sessions: Arc<Mutex<SessionMap>>,
}

impl ChatState {
    pub fn new(
        model: String,
        completion: Arc<dyn CompletionClient>,
        registry: Arc<FunctionRegistry>,
    ) -> Self {
        Self { model, completion, registry, sessions: Arc::new(Mutex::new(HashMap::new())) }
    }

    async fn session(&self, conversation_id: &str) -> Arc<Mutex<ChatSession>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ChatSession::new(
                    self.model.clone(),
                    system_prompt(),
                    self.completion.clone(),
                    self.registry.clone(),
                )))
            })
            .clone()
    }

    async fn existing_session(&self, conversation_id: &str) -> Option<Arc<Mutex<ChatSession>>> {
        self.sessions.lock().await.get(conversation_id).cloned()
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitMessageResponse {
    pub id: u64,
    pub fragment: UiFragment,
}

#[derive(Debug, Serialize)]
pub struct FragmentListResponse {
    pub conversation_id: String,
    pub fragments: Vec<UiFragment>,
}

#[derive(Debug, Serialize)]
struct ChatError {
    error: String,
    correlation_id: String,
}

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/api/v1/conversations/{conversation_id}/messages", post(submit_message))
        .route("/api/v1/conversations/{conversation_id}/fragments", get(list_fragments))
        .with_state(state)
}

async fn submit_message(
    Path(conversation_id): Path<String>,
    State(state): State<ChatState>,
    Json(payload): Json<SubmitMessageRequest>,
) -> Result<(StatusCode, Json<SubmitMessageResponse>), (StatusCode, Json<ChatError>)> {
    let correlation_id = Uuid::new_v4().simple().to_string();

    if payload.text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ChatError {
                error: "message text must not be empty".to_string(),
                correlation_id,
            }),
        ));
    }

    let session = state.session(&conversation_id).await;
    let mut session = session.lock().await;

    info!(
        event_name = "api.chat.message_received",
        correlation_id = %correlation_id,
        conversation_id = %conversation_id,
        "running chat turn"
    );

    match session.submit_message(&payload.text).await {
        Ok(receipt) => {
            let fragment = session.fragment(receipt.fragment_id).cloned().ok_or_else(|| {
                interface_response(InterfaceError::Internal {
                    message: "turn completed without a fragment".to_string(),
                    correlation_id: correlation_id.clone(),
                })
            })?;
            Ok((
                StatusCode::CREATED,
                Json(SubmitMessageResponse { id: receipt.fragment_id.0, fragment }),
            ))
        }
        Err(turn_error) => {
            error!(
                event_name = "api.chat.turn_failed",
                correlation_id = %correlation_id,
                conversation_id = %conversation_id,
                error = %turn_error,
                "chat turn failed"
            );
            Err(interface_response(turn_error.into_interface(correlation_id)))
        }
    }
}

async fn list_fragments(
    Path(conversation_id): Path<String>,
    State(state): State<ChatState>,
) -> Json<FragmentListResponse> {
    let fragments = match state.existing_session(&conversation_id).await {
        Some(session) => session.lock().await.fragments().to_vec(),
        None => Vec::new(),
    };

    Json(FragmentListResponse { conversation_id, fragments })
}

fn interface_response(interface: InterfaceError) -> (StatusCode, Json<ChatError>) {
    let (status, correlation_id) = match &interface {
        InterfaceError::BadRequest { correlation_id, .. } => {
            (StatusCode::BAD_REQUEST, correlation_id.clone())
        }
        InterfaceError::ServiceUnavailable { correlation_id, .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, correlation_id.clone())
        }
        InterfaceError::Internal { correlation_id, .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, correlation_id.clone())
        }
    };

    (status, Json(ChatError { error: interface.user_message().to_string(), correlation_id }))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use parley_agent::completion::{
        CompletionClient, CompletionEvent, CompletionEvents, CompletionRequest,
    };
    use parley_agent::handlers::default_registry;
    use parley_core::errors::ApplicationError;
    use parley_stripe::{ApiCustomer, ApiProduct, CrmGateway};
    use serde_json::Value;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use super::{router, ChatState};

    type Script = Vec<Result<CompletionEvent, ApplicationError>>;

    struct ScriptedCompletionClient {
        scripts: Mutex<VecDeque<Script>>,
    }

    #[async_trait]
    impl CompletionClient for ScriptedCompletionClient {
        async fn stream_chat(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionEvents, ApplicationError> {
            let events = self.scripts.lock().expect("lock").pop_front().unwrap_or_default();
            let (tx, rx) = mpsc::channel(events.len().max(1));
            for event in events {
                tx.try_send(event).expect("scripted channel has capacity");
            }
            Ok(rx)
        }
    }

    struct EmptyGateway;

    #[async_trait]
    impl CrmGateway for EmptyGateway {
        async fn list_customers(&self) -> Result<Vec<ApiCustomer>, ApplicationError> {
            Ok(Vec::new())
        }

        async fn list_products(&self, _limit: u32) -> Result<Vec<ApiProduct>, ApplicationError> {
            Ok(Vec::new())
        }
    }

    fn state_with(scripts: Vec<Script>) -> ChatState {
        let completion = Arc::new(ScriptedCompletionClient { scripts: Mutex::new(scripts.into()) });
        let registry = Arc::new(default_registry(Arc::new(EmptyGateway)));
        ChatState::new("gpt-test".to_string(), completion, registry)
    }

    async fn body_json(body: Body) -> Value {
        let bytes = to_bytes(body, usize::MAX).await.expect("body should collect");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    fn post_message(conversation_id: &str, text: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/api/v1/conversations/{conversation_id}/messages"))
            .header("content-type", "application/json")
            .body(Body::from(format!("{{\"text\":\"{text}\"}}")))
            .expect("request should build")
    }

    #[tokio::test]
    async fn submitting_a_message_returns_the_final_fragment() {
        let app = router(state_with(vec![vec![
            Ok(CompletionEvent::TextDelta("Hello!".to_string())),
            Ok(CompletionEvent::Finished),
        ]]));

        let response =
            app.oneshot(post_message("conv-1", "hi")).await.expect("request should succeed");

        assert_eq!(response.status(), StatusCode::CREATED);
        let payload = body_json(response.into_body()).await;
        assert_eq!(payload["id"], 0);
        assert_eq!(payload["fragment"]["phase"], "final");
        assert_eq!(payload["fragment"]["body"]["kind"], "markdown");
        assert_eq!(payload["fragment"]["body"]["text"], "Hello!");
    }

    #[tokio::test]
    async fn fragments_are_listed_in_order_for_a_conversation() {
        let app = router(state_with(vec![
            vec![
                Ok(CompletionEvent::TextDelta("First.".to_string())),
                Ok(CompletionEvent::Finished),
            ],
            vec![
                Ok(CompletionEvent::TextDelta("Second.".to_string())),
                Ok(CompletionEvent::Finished),
            ],
        ]));

        let first = app
            .clone()
            .oneshot(post_message("conv-1", "one"))
            .await
            .expect("request should succeed");
        assert_eq!(first.status(), StatusCode::CREATED);
        let second = app
            .clone()
            .oneshot(post_message("conv-1", "two"))
            .await
            .expect("request should succeed");
        assert_eq!(second.status(), StatusCode::CREATED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/conversations/conv-1/fragments")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_json(response.into_body()).await;
        let fragments = payload["fragments"].as_array().expect("fragment list");
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0]["body"]["text"], "First.");
        assert_eq!(fragments[1]["body"]["text"], "Second.");
    }

    #[tokio::test]
    async fn unknown_conversations_list_no_fragments() {
        let app = router(state_with(vec![]));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/conversations/missing/fragments")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_json(response.into_body()).await;
        assert_eq!(payload["fragments"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn empty_message_text_is_a_bad_request() {
        let app = router(state_with(vec![]));

        let response =
            app.oneshot(post_message("conv-1", "  ")).await.expect("request should succeed");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = body_json(response.into_body()).await;
        assert_eq!(payload["error"], "message text must not be empty");
    }

    #[tokio::test]
    async fn provider_failures_surface_as_service_unavailable() {
        let app = router(state_with(vec![vec![Err(ApplicationError::Completion(
            "stream reset by provider".to_string(),
        ))]]));

        let response =
            app.oneshot(post_message("conv-1", "hi")).await.expect("request should succeed");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let payload = body_json(response.into_body()).await;
        assert_eq!(payload["error"], "An upstream provider is unavailable. Please retry shortly.");
        assert!(payload["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }
}
