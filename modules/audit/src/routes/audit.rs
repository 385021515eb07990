use crate::models::{AuditLogResponse, AuditLogRow};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;

pub fn router(db: Arc<PgPool>) -> Router {
    Router::new()
        .route("/audit/logs", get(list_logs))
        .route("/audit/logs/{resource_type}/{resource_id}", get(logs_by_resource))
        .with_state(db)
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    user_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    100
}

async fn list_logs(
    State(db): State<Arc<PgPool>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<AuditLogResponse>>, (StatusCode, String)> {
    let limit = query.limit.clamp(1, 1000);

    let rows: Vec<AuditLogRow> = match &query.user_id {
        Some(user_id) => sqlx::query_as(
            r#"
            SELECT id, event_id, event_type, user_id, resource_type, resource_id, action,
                   metadata, occurred_at, recorded_at
            FROM audit_logs
            WHERE user_id = $1
            ORDER BY recorded_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(db.as_ref())
        .await,
        None => sqlx::query_as(
            r#"
            SELECT id, event_id, event_type, user_id, resource_type, resource_id, action,
                   metadata, occurred_at, recorded_at
            FROM audit_logs
            ORDER BY recorded_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(db.as_ref())
        .await,
    }
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}")))?;

    Ok(Json(rows.into_iter().map(AuditLogResponse::from).collect()))
}

async fn logs_by_resource(
    State(db): State<Arc<PgPool>>,
    Path((resource_type, resource_id)): Path<(String, String)>,
) -> Result<Json<Vec<AuditLogResponse>>, (StatusCode, String)> {
    let rows: Vec<AuditLogRow> = sqlx::query_as(
        r#"
        SELECT id, event_id, event_type, user_id, resource_type, resource_id, action,
               metadata, occurred_at, recorded_at
        FROM audit_logs
        WHERE resource_type = $1 AND resource_id = $2
        ORDER BY recorded_at DESC
        "#,
    )
    .bind(&resource_type)
    .bind(&resource_id)
    .fetch_all(db.as_ref())
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}")))?;

    Ok(Json(rows.into_iter().map(AuditLogResponse::from).collect()))
}
