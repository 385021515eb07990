pub mod audit;

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "audit",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
