//! HTTP surface.
//!
//! [`create_router`] assembles every route over one shared [`AppState`].
//! Admin routes sit behind an `X-Api-Key` check when an admin key is
//! configured; newsletter routes are CORS-enabled and rate limited.
//! In production, 5xx bodies carry a generic message instead of the error.

pub mod blog;
pub mod headers;
pub mod health;
pub mod newsletter;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use sqlx::SqlitePool;

use crate::cache::StatsCache;
use crate::config::Config;
use crate::error::{sanitized_response, AppError, ServerFailure};
use crate::metrics::AppMetrics;
use crate::monitoring::{BlogSchedulerMonitoring, NewsletterMonitoring};
use crate::newsletter::NewsletterService;
use crate::rate_limit::RateLimiter;
use crate::scheduler::BlogPostScheduler;

use self::headers::{constant_time_eq, API_KEY_HEADER};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub scheduler: Arc<BlogPostScheduler>,
    pub blog_monitoring: Arc<BlogSchedulerMonitoring>,
    pub newsletter: Arc<NewsletterService>,
    pub newsletter_monitoring: Arc<NewsletterMonitoring>,
    pub rate_limiter: Arc<RateLimiter>,
    pub stats_cache: Arc<StatsCache>,
    pub metrics: Arc<AppMetrics>,
}

pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/admin/blog/health", get(blog::blog_health))
        .route(
            "/api/admin/blog/process-scheduled",
            get(blog::scheduling_stats).post(blog::process_scheduled),
        )
        .route("/api/admin/blog/monitoring", get(blog::monitoring))
        .route("/api/admin/blog/schedule", post(blog::schedule_post))
        .route("/api/admin/blog/schedule/:id", delete(blog::unschedule_post))
        .route("/api/admin/blog/posts/:id/publish", post(blog::publish_post))
        .route("/api/admin/newsletter/monitoring", get(newsletter::monitoring))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin_key));

    let public_newsletter = Router::new()
        .route("/api/newsletter/subscribe", post(newsletter::subscribe))
        .route("/api/newsletter/unsubscribe", post(newsletter::unsubscribe))
        .layer(newsletter::cors_layer());

    Router::new()
        .route("/api/health", get(health::health))
        .route("/metrics", get(render_metrics))
        .merge(admin)
        .merge(public_newsletter)
        .layer(middleware::from_fn_with_state(state.clone(), track_http_metrics))
        .layer(middleware::from_fn_with_state(state.clone(), sanitize_server_errors))
        .with_state(state)
}

/// Rejects admin requests without the configured `X-Api-Key`. Open when no
/// key is configured.
async fn require_admin_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = state.config.admin_api_key.as_deref() {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            return Err(AppError::Unauthorized("Invalid or missing API key".to_string()));
        }
    }
    Ok(next.run(request).await)
}

async fn sanitize_server_errors(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if !state.config.environment.sanitizes_errors() {
        return response;
    }
    match response.extensions().get::<ServerFailure>().copied() {
        Some(failure) => sanitized_response(failure),
        None => response,
    }
}

async fn track_http_metrics(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    state
        .metrics
        .http_requests_total
        .with_label_values(&[&method, &path, response.status().as_str()])
        .inc();
    state
        .metrics
        .http_request_duration
        .observe(started.elapsed().as_secs_f64());
    response
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            Body::from(body),
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics error").into_response()
        }
    }
}
