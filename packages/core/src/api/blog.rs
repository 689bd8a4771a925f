//! Admin endpoints for the blog scheduler.
//!
//! Routes (all behind the admin key check):
//! - `GET    /api/admin/blog/health`
//! - `GET    /api/admin/blog/process-scheduled`   stats, cached briefly
//! - `POST   /api/admin/blog/process-scheduled`   run one processing pass
//! - `GET    /api/admin/blog/monitoring[?format=prometheus]`
//! - `POST   /api/admin/blog/schedule`
//! - `DELETE /api/admin/blog/schedule/:id`
//! - `POST   /api/admin/blog/posts/:id/publish`

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::headers::{no_store, private_max_age};
use super::AppState;
use crate::error::AppError;
use crate::scheduler::ALREADY_IN_PROGRESS;

const STATS_MAX_AGE_SECS: u64 = 5;
const MONITORING_ALERT_LIMIT: usize = 20;

/// `GET /api/admin/blog/health`
pub async fn blog_health(State(state): State<AppState>) -> Response {
    let (health, stats) = tokio::join!(
        state.scheduler.health_check(),
        state.scheduler.get_blog_scheduling_stats()
    );
    let runtime = state.scheduler.runtime_snapshot();

    let mut errors = health.errors.clone();
    errors.extend(stats.errors.iter().cloned());

    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if health.healthy { "healthy" } else { "unhealthy" },
        "health": {
            "overall": health.healthy,
            "scheduler": {
                "processing": runtime.processing,
                "lastRun": runtime.last_run,
                "nextRun": runtime.next_run,
            },
            "services": health.services,
        },
        "statistics": {
            "totalScheduled": stats.total_scheduled,
            "readyToProcess": stats.ready_to_process,
        },
        "errors": errors,
    });

    (status, [no_store()], Json(body)).into_response()
}

/// `GET /api/admin/blog/process-scheduled`. No side effects.
pub async fn scheduling_stats(State(state): State<AppState>) -> Response {
    let runs = state.scheduler.runtime_snapshot().runs;
    let stats = match state.stats_cache.get(runs) {
        Some(cached) => cached,
        None => {
            let fresh = state.scheduler.get_blog_scheduling_stats().await;
            state.stats_cache.set(fresh.clone(), runs);
            fresh
        }
    };

    (
        [private_max_age(STATS_MAX_AGE_SECS)],
        Json(json!({ "success": true, "data": stats })),
    )
        .into_response()
}

/// `POST /api/admin/blog/process-scheduled`
pub async fn process_scheduled(State(state): State<AppState>) -> Response {
    let result = state.scheduler.process_scheduled_blog_posts().await;
    state.metrics.record_run(&result);

    if result.was_rejected() {
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "data": result,
                "error": ALREADY_IN_PROGRESS,
                "message": ALREADY_IN_PROGRESS,
            })),
        )
            .into_response();
    }

    state.stats_cache.invalidate();
    let message = format!(
        "Processed {} scheduled blog post(s): {} published, {} failed",
        result.processed, result.successful, result.failed
    );
    Json(json!({ "success": true, "data": result, "message": message })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct MonitoringQuery {
    pub format: Option<String>,
}

/// `GET /api/admin/blog/monitoring`
pub async fn monitoring(
    State(state): State<AppState>,
    Query(query): Query<MonitoringQuery>,
) -> Result<Response, AppError> {
    let monitor = &state.blog_monitoring;
    let snapshot = monitor.collect_metrics().await;
    monitor.check_alerts(&snapshot);
    let export = monitor
        .export_metrics(&snapshot, &state.metrics)
        .map_err(|err| AppError::Internal(format!("Failed to render metrics: {}", err)))?;

    if query.format.as_deref() == Some("prometheus") {
        return Ok((
            [
                (header::CONTENT_TYPE, "text/plain; version=0.0.4"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            export.prometheus,
        )
            .into_response());
    }

    let runtime = state.scheduler.runtime_snapshot();
    let body = json!({
        "success": true,
        "data": {
            "health": monitor.get_health_summary(),
            "metrics": export.json,
            "alerts": monitor.recent_alerts(MONITORING_ALERT_LIMIT),
            "lastResult": runtime.last_result,
            "recentErrors": runtime.recent_errors,
        },
    });
    Ok(([no_store()], Json(body)).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub post_id: Option<String>,
    pub scheduled_at: Option<String>,
}

/// `POST /api/admin/blog/schedule` with `{postId, scheduledAt}`.
pub async fn schedule_post(
    State(state): State<AppState>,
    body: Result<Json<ScheduleRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(request) = body.map_err(|err| AppError::validation(err.body_text()))?;

    let mut details = Vec::new();
    let post_id = request
        .post_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    if post_id.is_none() {
        details.push(json!({ "field": "postId", "message": "postId is required" }));
    }

    let scheduled_at = match request.scheduled_at.as_deref() {
        None => {
            details.push(json!({ "field": "scheduledAt", "message": "scheduledAt is required" }));
            None
        }
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) if ts.with_timezone(&Utc) > Utc::now() => Some(ts.with_timezone(&Utc)),
            Ok(_) => {
                details.push(json!({ "field": "scheduledAt", "message": "scheduledAt must be in the future" }));
                None
            }
            Err(_) => {
                details.push(json!({ "field": "scheduledAt", "message": "scheduledAt must be an RFC 3339 timestamp" }));
                None
            }
        },
    };

    let (Some(post_id), Some(scheduled_at)) = (post_id, scheduled_at) else {
        return Err(AppError::validation_with_details(
            "Invalid schedule request",
            json!(details),
        ));
    };

    if !state.scheduler.schedule_blog_post(post_id, scheduled_at).await {
        return Err(AppError::Network(format!("Failed to schedule blog post {}", post_id)));
    }
    state.stats_cache.invalidate();

    Ok(Json(json!({
        "success": true,
        "message": "Blog post scheduled",
        "data": { "postId": post_id, "scheduledAt": scheduled_at },
    })))
}

/// `DELETE /api/admin/blog/schedule/:id`
pub async fn unschedule_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.scheduler.unschedule_blog_post(&id).await {
        return Err(AppError::Network(format!("Failed to unschedule blog post {}", id)));
    }
    state.stats_cache.invalidate();

    Ok(Json(json!({
        "success": true,
        "message": "Blog post unscheduled",
        "data": { "postId": id },
    })))
}

/// `POST /api/admin/blog/posts/:id/publish`
pub async fn publish_post(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = state.scheduler.publish_now(&id).await;
    state.stats_cache.invalidate();

    if result.success {
        state.metrics.posts_published_total.inc();
        Json(json!({ "success": true, "data": result, "message": "Blog post published" }))
            .into_response()
    } else {
        state.metrics.posts_failed_total.inc();
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "success": false,
                "data": result,
                "error": format!("Failed to publish blog post {}", id),
            })),
        )
            .into_response()
    }
}
