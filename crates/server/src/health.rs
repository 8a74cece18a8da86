use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use concierge_core::config::AppConfig;
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Debug)]
pub struct HealthState {
    search_configured: bool,
    llm_configured: bool,
    llm_detail: String,
}

impl HealthState {
    pub fn from_config(config: &AppConfig) -> Self {
        let llm_configured = config.llm.base_url.is_some()
            || config
                .llm
                .api_key
                .as_ref()
                .map(|key| !key.expose_secret().trim().is_empty())
                .unwrap_or(false);

        Self {
            search_configured: !config.search.api_key.expose_secret().trim().is_empty(),
            llm_configured,
            llm_detail: format!("{:?} / {}", config.llm.provider, config.llm.model),
        }
    }
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
    pub search: HealthCheck,
    pub llm: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let search = if state.search_configured {
        HealthCheck { status: "ready", detail: "search api key configured".to_string() }
    } else {
        HealthCheck { status: "degraded", detail: "search api key missing".to_string() }
    };
    let llm = if state.llm_configured {
        HealthCheck { status: "ready", detail: state.llm_detail.clone() }
    } else {
        HealthCheck { status: "degraded", detail: format!("{} (no credentials)", state.llm_detail) }
    };
    let ready = search.status == "ready" && llm.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "concierge-server runtime initialized".to_string(),
        },
        search,
        llm,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
