use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde::Serialize;

use super::{headers::no_store, AppState};
use crate::db;

#[derive(Debug, Serialize)]
pub struct ServiceStatuses {
    pub database: &'static str,
    pub openai: &'static str,
    pub brevo: &'static str,
    pub linkedin: &'static str,
    pub twitter: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub timestamp: String,
    pub status: &'static str,
    pub version: &'static str,
    pub environment: &'static str,
    pub services: ServiceStatuses,
}

fn configured(present: bool) -> &'static str {
    if present {
        "configured"
    } else {
        "not configured"
    }
}

/// `GET /api/health`. Provider entries only report whether credentials are
/// present; the database is actually queried.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match db::ping(&state.pool).await {
        Ok(()) => "connected",
        Err(err) => {
            tracing::error!("Health check database ping failed: {}", err);
            "error"
        }
    };
    let providers = &state.config.providers;

    let healthy = database == "connected";
    let body = HealthResponse {
        timestamp: Utc::now().to_rfc3339(),
        status: if healthy { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.as_str(),
        services: ServiceStatuses {
            database,
            openai: configured(providers.openai_configured()),
            brevo: configured(providers.brevo_configured()),
            linkedin: configured(providers.linkedin_configured()),
            twitter: configured(providers.twitter_configured()),
        },
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, [no_store()], Json(body))
}
