use crate::metrics::Metrics;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct HealthState {
    pub db: PgPool,
    /// Absent when the service runs on the in-memory bus
    pub nats: Option<async_nats::Client>,
    pub metrics: Metrics,
}

pub async fn health_live() -> StatusCode {
    StatusCode::OK
}

pub async fn health_ready(
    State(state): State<Arc<HealthState>>,
) -> Result<Json<Value>, StatusCode> {
    let db_ok = sqlx::query("SELECT 1").fetch_one(&state.db).await.is_ok();
    state
        .metrics
        .dep_up
        .with_label_values(&["db"])
        .set(i64::from(db_ok));

    if !db_ok {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let bus_ok = match &state.nats {
        Some(client) => client.connection_state() == async_nats::connection::State::Connected,
        None => true,
    };
    state
        .metrics
        .dep_up
        .with_label_values(&["bus"])
        .set(i64::from(bus_ok));

    if !bus_ok {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(json!({
        "status": "ready",
        "database": "connected",
        "bus": "connected"
    })))
}
