use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use parley_core::config::AppConfig;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    config: AppConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub configuration: HealthCheck,
    pub checked_at: String,
}

pub fn router(config: AppConfig) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { config })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let configuration = configuration_check(&state.config);
    let ready = configuration.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "parley-server runtime initialized".to_string(),
        },
        configuration,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn configuration_check(config: &AppConfig) -> HealthCheck {
    match config.validate() {
        Ok(()) => HealthCheck {
            status: "ready",
            detail: "provider credentials configured".to_string(),
        },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("configuration validation failed: {error}"),
        },
    }
}
