use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use super::headers::no_store;
use super::AppState;
use crate::error::AppError;
use crate::newsletter::{SubscribeRequest, UnsubscribeRequest};
use crate::rate_limit::client_ip;

/// The public signup form is embedded on other origins.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

fn enforce_rate_limit(state: &AppState, key: &str) -> Result<(), AppError> {
    state.rate_limiter.check(key).map_err(|retry_after_secs| {
        state.newsletter_monitoring.record_rate_limited();
        state.metrics.record_subscription("rate_limited");
        tracing::warn!(client = key, "Newsletter request rate limited");
        AppError::RateLimited { retry_after_secs }
    })
}

/// `POST /api/newsletter/subscribe`
pub async fn subscribe(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    enforce_rate_limit(&state, &ip)?;
    state.newsletter_monitoring.record_attempt();

    let Json(request) = body.map_err(|err| {
        state.metrics.record_subscription("invalid");
        AppError::validation(format!("Invalid request body: {}", err.body_text()))
    })?;

    match state.newsletter.subscribe(request).await {
        Ok(outcome) => {
            state.metrics.record_subscription(outcome.label());
            let status = if outcome.is_created() {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            Ok((
                status,
                [no_store()],
                Json(json!({
                    "success": true,
                    "message": outcome.message(),
                    "subscriber": outcome.subscriber(),
                })),
            )
                .into_response())
        }
        Err(err) => {
            if err.status().is_server_error() {
                state.newsletter_monitoring.record_failure();
                state.metrics.record_subscription("error");
            } else {
                state.metrics.record_subscription("invalid");
            }
            Err(err)
        }
    }
}

/// `POST /api/newsletter/unsubscribe`
pub async fn unsubscribe(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<UnsubscribeRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    enforce_rate_limit(&state, &format!("unsubscribe:{}", ip))?;

    let Json(request) =
        body.map_err(|err| AppError::validation(format!("Invalid request body: {}", err.body_text())))?;
    state.newsletter.unsubscribe(&request.email).await?;

    Ok(Json(json!({
        "success": true,
        "message": "You have been unsubscribed",
    }))
    .into_response())
}

/// `GET /api/admin/newsletter/monitoring`
pub async fn monitoring(State(state): State<AppState>) -> Response {
    let monitor = &state.newsletter_monitoring;
    let metrics = monitor.collect_metrics().await;
    monitor.check_alerts(&metrics);

    (
        [no_store()],
        Json(json!({
            "success": true,
            "data": {
                "health": monitor.get_health_summary(),
                "metrics": metrics,
                "alerts": monitor.recent_alerts(20),
            },
        })),
    )
        .into_response()
}
