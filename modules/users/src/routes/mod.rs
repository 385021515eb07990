pub mod users;

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "users",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub type ApiErr = (StatusCode, String);

pub fn err(code: StatusCode, msg: impl Into<String>) -> ApiErr {
    (code, msg.into())
}
