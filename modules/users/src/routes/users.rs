use crate::events::subjects;
use crate::jwt::{AccessClaims, JwtValidator};
use crate::models::{CreateUserReq, ListQuery, UpdateUserReq, UserResponse, UserRow, ROLES};
use crate::routes::{err, ApiErr};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use event_bus::{EventEnvelope, EventPublisher, JsonMap};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct UsersState {
    pub db: sqlx::PgPool,
    pub events: EventPublisher,
    pub jwt: JwtValidator,
}

pub fn router(state: Arc<UsersState>) -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .with_state(state)
}

fn authenticate(state: &UsersState, headers: &HeaderMap) -> Result<AccessClaims, ApiErr> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "missing bearer token"))?;

    state
        .jwt
        .validate(token)
        .map_err(|_| err(StatusCode::UNAUTHORIZED, "invalid token"))
}

fn require_admin(claims: &AccessClaims) -> Result<(), ApiErr> {
    if claims.role != "admin" {
        return Err(err(StatusCode::FORBIDDEN, "admin role required"));
    }
    Ok(())
}

async fn list_users(
    State(state): State<Arc<UsersState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiErr> {
    authenticate(&state, &headers)?;

    let rows: Vec<UserRow> = sqlx::query_as(
        r#"
        SELECT id, email, full_name, role, phone, department, is_active, is_verified, created_at, updated_at
        FROM users
        ORDER BY created_at
        OFFSET $1 LIMIT $2
        "#,
    )
    .bind(query.skip.max(0))
    .bind(query.limit.clamp(1, 1000))
    .fetch_all(&state.db)
    .await
    .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}")))?;

    let users: Vec<UserResponse> = rows.into_iter().map(UserResponse::from).collect();
    Ok(Json(users))
}

async fn get_user(
    State(state): State<Arc<UsersState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiErr> {
    authenticate(&state, &headers)?;

    let row: Option<UserRow> = sqlx::query_as(
        r#"
        SELECT id, email, full_name, role, phone, department, is_active, is_verified, created_at, updated_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}")))?;

    match row {
        Some(row) => Ok(Json(UserResponse::from(row))),
        None => Err(err(StatusCode::NOT_FOUND, "user not found")),
    }
}

async fn create_user(
    State(state): State<Arc<UsersState>>,
    headers: HeaderMap,
    Json(req): Json<CreateUserReq>,
) -> Result<impl IntoResponse, ApiErr> {
    let claims = authenticate(&state, &headers)?;
    require_admin(&claims)?;

    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(err(StatusCode::BAD_REQUEST, "invalid email"));
    }
    let full_name = req.full_name.trim().to_string();
    if full_name.len() < 2 {
        return Err(err(StatusCode::BAD_REQUEST, "full name must be at least 2 characters"));
    }
    let role = req.role.unwrap_or_else(|| "user".to_string());
    if !ROLES.contains(&role.as_str()) {
        return Err(err(StatusCode::BAD_REQUEST, format!("invalid role: {role}")));
    }

    let id = Uuid::new_v4();
    let now = Utc::now();

    let res = sqlx::query(
        r#"
        INSERT INTO users (id, email, full_name, role, phone, department, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
        "#,
    )
    .bind(id)
    .bind(&email)
    .bind(&full_name)
    .bind(&role)
    .bind(&req.phone)
    .bind(&req.department)
    .bind(now)
    .execute(&state.db)
    .await;

    if let Err(e) = res {
        if let Some(db_err) = e.as_database_error() {
            if db_err.code().as_deref() == Some("23505") {
                return Err(err(StatusCode::CONFLICT, "email already registered"));
            }
        }
        return Err(err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}")));
    }

    // announce the local write; failure only costs downstream freshness
    let mut data = JsonMap::new();
    data.insert("id".into(), json!(id));
    data.insert("email".into(), json!(email));
    data.insert("full_name".into(), json!(full_name));
    data.insert("role".into(), json!(role));
    if let Some(phone) = &req.phone {
        data.insert("phone".into(), json!(phone));
    }
    if let Some(department) = &req.department {
        data.insert("department".into(), json!(department));
    }
    data.insert("created_at".into(), json!(now));

    let envelope =
        EventEnvelope::new(subjects::USER_CREATED, data).with_user(claims.sub.clone());
    if let Err(e) = state.events.publish(subjects::USER_CREATED, &envelope).await {
        tracing::warn!(user_id = %id, error = %e, "user.created publish failed");
    }

    let row: UserRow = sqlx::query_as(
        r#"
        SELECT id, email, full_name, role, phone, department, is_active, is_verified, created_at, updated_at
        FROM users WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}")))?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(row))))
}

async fn update_user(
    State(state): State<Arc<UsersState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserReq>,
) -> Result<impl IntoResponse, ApiErr> {
    let claims = authenticate(&state, &headers)?;
    require_admin(&claims)?;

    if let Some(full_name) = &req.full_name {
        if full_name.trim().is_empty() {
            return Err(err(StatusCode::BAD_REQUEST, "full name cannot be empty"));
        }
    }
    if let Some(role) = &req.role {
        if !ROLES.contains(&role.as_str()) {
            return Err(err(StatusCode::BAD_REQUEST, format!("invalid role: {role}")));
        }
    }

    let result = sqlx::query(
        r#"
        UPDATE users
        SET full_name = COALESCE($2, full_name),
            role = COALESCE($3, role),
            phone = COALESCE($4, phone),
            department = COALESCE($5, department),
            is_active = COALESCE($6, is_active),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(req.full_name.as_ref().map(|s| s.trim().to_string()))
    .bind(&req.role)
    .bind(&req.phone)
    .bind(&req.department)
    .bind(req.is_active)
    .execute(&state.db)
    .await
    .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}")))?;

    if result.rows_affected() == 0 {
        return Err(err(StatusCode::NOT_FOUND, "user not found"));
    }

    // partial payload: only the fields this request actually changed
    let mut data = JsonMap::new();
    data.insert("id".into(), json!(id));
    if let Some(full_name) = &req.full_name {
        data.insert("full_name".into(), json!(full_name.trim()));
    }
    if let Some(role) = &req.role {
        data.insert("role".into(), json!(role));
    }
    if let Some(phone) = &req.phone {
        data.insert("phone".into(), json!(phone));
    }
    if let Some(department) = &req.department {
        data.insert("department".into(), json!(department));
    }
    if let Some(is_active) = req.is_active {
        data.insert("is_active".into(), json!(is_active));
    }

    let envelope = EventEnvelope::new(subjects::USER_UPDATED, data).with_user(claims.sub.clone());
    if let Err(e) = state.events.publish(subjects::USER_UPDATED, &envelope).await {
        tracing::warn!(user_id = %id, error = %e, "user.updated publish failed");
    }

    let row: UserRow = sqlx::query_as(
        r#"
        SELECT id, email, full_name, role, phone, department, is_active, is_verified, created_at, updated_at
        FROM users WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}")))?;

    Ok(Json(UserResponse::from(row)))
}

async fn delete_user(
    State(state): State<Arc<UsersState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiErr> {
    let claims = authenticate(&state, &headers)?;
    require_admin(&claims)?;

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}")))?;

    if result.rows_affected() == 0 {
        return Err(err(StatusCode::NOT_FOUND, "user not found"));
    }

    let mut data = JsonMap::new();
    data.insert("id".into(), json!(id));

    let envelope = EventEnvelope::new(subjects::USER_DELETED, data).with_user(claims.sub.clone());
    if let Err(e) = state.events.publish(subjects::USER_DELETED, &envelope).await {
        tracing::warn!(user_id = %id, error = %e, "user.deleted publish failed");
    }

    Ok(StatusCode::NO_CONTENT)
}
