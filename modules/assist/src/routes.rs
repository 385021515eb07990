use crate::domain::Document;
use crate::error::AssistError;
use crate::use_cases::{IndexDocument, RagQuery};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub struct AssistState {
    pub index: IndexDocument,
    pub query: RagQuery,
}

pub fn router(state: Arc<AssistState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/documents", post(index_document))
        .route("/chat/query", post(chat_query))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "assist",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Deserialize)]
struct IndexDocumentReq {
    id: Option<String>,
    title: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct QueryReq {
    text: String,
    top_k: Option<usize>,
}

type ApiErr = (StatusCode, String);

fn map_error(e: AssistError) -> ApiErr {
    match e {
        AssistError::Http(e) => (StatusCode::BAD_GATEWAY, format!("upstream error: {e}")),
        AssistError::Provider(msg) => (StatusCode::BAD_GATEWAY, msg),
        AssistError::Store(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
    }
}

async fn index_document(
    State(state): State<Arc<AssistState>>,
    Json(req): Json<IndexDocumentReq>,
) -> Result<impl IntoResponse, ApiErr> {
    if req.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "content cannot be empty".into()));
    }

    let document = Document {
        id: req.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        title: req.title,
        content: req.content,
        created_at: Utc::now(),
    };

    let summary = state.index.execute(&document).await.map_err(map_error)?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn chat_query(
    State(state): State<Arc<AssistState>>,
    Json(req): Json<QueryReq>,
) -> Result<impl IntoResponse, ApiErr> {
    if req.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "text cannot be empty".into()));
    }

    let response = state
        .query
        .execute(&req.text, req.top_k)
        .await
        .map_err(map_error)?;
    Ok(Json(response))
}
