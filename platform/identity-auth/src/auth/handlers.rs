use crate::{
    events::{self, subjects},
    metrics::Metrics,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use event_bus::{EventEnvelope, EventPublisher};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    jwt::JwtKeys,
    password::{hash_password, verify_password, PasswordPolicy},
    password_policy::{validate_password, PasswordRules},
    refresh::{generate_refresh_token, hash_refresh_token},
};

#[derive(Clone)]
pub struct AuthState {
    pub db: PgPool,
    pub jwt: JwtKeys,
    pub pwd: PasswordPolicy,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    pub events: EventPublisher,
    pub metrics: Metrics,
}

type ApiErr = (StatusCode, String);

fn err(code: StatusCode, msg: impl Into<String>) -> ApiErr {
    (code, msg.into())
}

#[derive(Debug, Deserialize)]
pub struct RegisterReq {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginReq {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshReq {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutReq {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token_type: &'static str,
    pub access_token: String,
    pub expires_in_seconds: i64,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

pub async fn register(
    State(state): State<Arc<AuthState>>,
    Json(req): Json<RegisterReq>,
) -> Result<impl IntoResponse, ApiErr> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        state.metrics.register_total.with_label_values(&["failure", "invalid_email"]).inc();
        return Err(err(StatusCode::BAD_REQUEST, "invalid email"));
    }

    let full_name = req.full_name.trim().to_string();
    if full_name.len() < 2 {
        state.metrics.register_total.with_label_values(&["failure", "invalid_name"]).inc();
        return Err(err(StatusCode::BAD_REQUEST, "full name must be at least 2 characters"));
    }

    if let Err(e) = validate_password(&PasswordRules::default(), &req.password) {
        state.metrics.register_total.with_label_values(&["failure", "weak_password"]).inc();
        return Err(err(StatusCode::BAD_REQUEST, e.to_string()));
    }

    let hash = hash_password(&state.pwd, &req.password)
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    let user_id = Uuid::new_v4();
    let created_at = Utc::now();

    let res = sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, full_name, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&hash)
    .bind(&full_name)
    .bind(created_at)
    .execute(&state.db)
    .await;

    match res {
        Ok(_) => {
            state.metrics.register_total.with_label_values(&["success", "ok"]).inc();

            // The user row is committed; downstream propagation is
            // best-effort and never fails this request.
            let envelope = EventEnvelope::new(
                subjects::USER_CREATED,
                events::UserCreatedData {
                    id: user_id.to_string(),
                    email: email.clone(),
                    full_name: full_name.clone(),
                    role: "user".to_string(),
                    is_active: true,
                    is_verified: false,
                    created_at,
                },
            )
            .with_user(user_id.to_string());

            if let Err(e) = state.events.publish(subjects::USER_CREATED, &envelope).await {
                state.metrics.publish_fail_total.with_label_values(&[subjects::USER_CREATED]).inc();
                tracing::warn!(user_id = %user_id, error = %e, "user.created publish failed");
            }

            Ok((
                StatusCode::CREATED,
                Json(UserResponse {
                    id: user_id,
                    email,
                    full_name,
                    role: "user".to_string(),
                    is_active: true,
                    is_verified: false,
                    created_at,
                }),
            ))
        }
        Err(e) => {
            if let Some(db_err) = e.as_database_error() {
                if db_err.code().as_deref() == Some("23505") {
                    state.metrics.register_total.with_label_values(&["failure", "duplicate"]).inc();
                    return Err(err(StatusCode::CONFLICT, "email already registered"));
                }
            }
            state.metrics.register_total.with_label_values(&["failure", "db_error"]).inc();
            Err(err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}")))
        }
    }
}

pub async fn login(
    State(state): State<Arc<AuthState>>,
    Json(req): Json<LoginReq>,
) -> Result<impl IntoResponse, ApiErr> {
    let email = req.email.trim().to_lowercase();

    let row = sqlx::query(
        r#"
        SELECT id, password_hash, role, is_active
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| {
        state.metrics.login_total.with_label_values(&["failure", "db_error"]).inc();
        err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}"))
    })?;

    let row = match row {
        Some(r) => r,
        None => {
            state.metrics.login_total.with_label_values(&["failure", "not_found"]).inc();
            return Err(err(StatusCode::UNAUTHORIZED, "invalid email or password"));
        }
    };

    let user_id: Uuid = row.get("id");
    let password_hash: String = row.get("password_hash");
    let role: String = row.get("role");
    let is_active: bool = row.get("is_active");

    let ok = verify_password(&state.pwd, &req.password, &password_hash).map_err(|e| {
        state.metrics.login_total.with_label_values(&["failure", "verify_error"]).inc();
        err(StatusCode::INTERNAL_SERVER_ERROR, e)
    })?;

    if !ok {
        state.metrics.login_total.with_label_values(&["failure", "invalid_password"]).inc();
        return Err(err(StatusCode::UNAUTHORIZED, "invalid email or password"));
    }

    if !is_active {
        state.metrics.login_total.with_label_values(&["failure", "inactive"]).inc();
        return Err(err(StatusCode::FORBIDDEN, "account deactivated"));
    }

    let access = state
        .jwt
        .sign_access_token(user_id, &email, &role, state.access_ttl_minutes)
        .map_err(|e| {
            state.metrics.login_total.with_label_values(&["failure", "token_sign_error"]).inc();
            err(StatusCode::INTERNAL_SERVER_ERROR, e)
        })?;

    let refresh_raw = generate_refresh_token();
    let refresh_hash = hash_refresh_token(&refresh_raw);
    let expires_at = Utc::now() + Duration::days(state.refresh_ttl_days);

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user_id)
    .bind(&refresh_hash)
    .bind(expires_at)
    .execute(&state.db)
    .await
    .map_err(|e| {
        state.metrics.login_total.with_label_values(&["failure", "db_error"]).inc();
        err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}"))
    })?;

    state.metrics.login_total.with_label_values(&["success", "ok"]).inc();

    let envelope = EventEnvelope::new(subjects::AUTH_LOGIN, events::LoginData { email })
        .with_user(user_id.to_string());
    if let Err(e) = state.events.publish(subjects::AUTH_LOGIN, &envelope).await {
        state.metrics.publish_fail_total.with_label_values(&[subjects::AUTH_LOGIN]).inc();
        tracing::warn!(user_id = %user_id, error = %e, "auth.login publish failed");
    }

    Ok((
        StatusCode::OK,
        Json(TokenResponse {
            token_type: "Bearer",
            access_token: access,
            expires_in_seconds: state.access_ttl_minutes * 60,
            refresh_token: refresh_raw,
        }),
    ))
}

pub async fn refresh(
    State(state): State<Arc<AuthState>>,
    Json(req): Json<RefreshReq>,
) -> Result<impl IntoResponse, ApiErr> {
    let old_hash = hash_refresh_token(&req.refresh_token);

    let mut tx = state.db.begin().await.map_err(|e| {
        state.metrics.refresh_total.with_label_values(&["failure", "db_error"]).inc();
        err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}"))
    })?;

    let row = sqlx::query(
        r#"
        SELECT rt.id, rt.user_id, rt.expires_at, rt.revoked_at, u.email, u.role
        FROM refresh_tokens rt
        JOIN users u ON u.id = rt.user_id
        WHERE rt.token_hash = $1
        "#,
    )
    .bind(&old_hash)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| {
        state.metrics.refresh_total.with_label_values(&["failure", "db_error"]).inc();
        err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}"))
    })?;

    let row = match row {
        Some(r) => r,
        None => {
            state.metrics.refresh_total.with_label_values(&["failure", "invalid"]).inc();
            return Err(err(StatusCode::UNAUTHORIZED, "invalid refresh token"));
        }
    };

    let token_id: Uuid = row.get("id");
    let user_id: Uuid = row.get("user_id");
    let expires_at: DateTime<Utc> = row.get("expires_at");
    let revoked_at: Option<DateTime<Utc>> = row.get("revoked_at");
    let email: String = row.get("email");
    let role: String = row.get("role");

    if revoked_at.is_some() {
        state.metrics.refresh_total.with_label_values(&["failure", "revoked"]).inc();
        tracing::warn!(
            user_id = %user_id,
            token_hash_prefix = %&old_hash[..12],
            "security.refresh_replay_detected"
        );
        return Err(err(StatusCode::UNAUTHORIZED, "refresh token revoked"));
    }

    if expires_at < Utc::now() {
        state.metrics.refresh_total.with_label_values(&["failure", "expired"]).inc();
        return Err(err(StatusCode::UNAUTHORIZED, "refresh token expired"));
    }

    sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked_at = NOW(), last_used_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(token_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        state.metrics.refresh_total.with_label_values(&["failure", "db_error"]).inc();
        err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}"))
    })?;

    let new_raw = generate_refresh_token();
    let new_hash = hash_refresh_token(&new_raw);
    let new_expires_at = Utc::now() + Duration::days(state.refresh_ttl_days);

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user_id)
    .bind(&new_hash)
    .bind(new_expires_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        state.metrics.refresh_total.with_label_values(&["failure", "db_error"]).inc();
        err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}"))
    })?;

    tx.commit().await.map_err(|e| {
        state.metrics.refresh_total.with_label_values(&["failure", "db_error"]).inc();
        err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}"))
    })?;

    let access = state
        .jwt
        .sign_access_token(user_id, &email, &role, state.access_ttl_minutes)
        .map_err(|e| {
            state.metrics.refresh_total.with_label_values(&["failure", "token_sign_error"]).inc();
            err(StatusCode::INTERNAL_SERVER_ERROR, e)
        })?;

    state.metrics.refresh_total.with_label_values(&["success", "ok"]).inc();

    let envelope = EventEnvelope::new(subjects::AUTH_TOKEN_REFRESHED, events::TokenRefreshedData {})
        .with_user(user_id.to_string());
    if let Err(e) = state
        .events
        .publish(subjects::AUTH_TOKEN_REFRESHED, &envelope)
        .await
    {
        state.metrics.publish_fail_total.with_label_values(&[subjects::AUTH_TOKEN_REFRESHED]).inc();
        tracing::warn!(user_id = %user_id, error = %e, "auth.token_refreshed publish failed");
    }

    Ok((
        StatusCode::OK,
        Json(TokenResponse {
            token_type: "Bearer",
            access_token: access,
            expires_in_seconds: state.access_ttl_minutes * 60,
            refresh_token: new_raw,
        }),
    ))
}

pub async fn logout(
    State(state): State<Arc<AuthState>>,
    Json(req): Json<LogoutReq>,
) -> Result<impl IntoResponse, ApiErr> {
    let hash = hash_refresh_token(&req.refresh_token);

    let row = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked_at = NOW(), last_used_at = NOW()
        WHERE token_hash = $1 AND revoked_at IS NULL
        RETURNING user_id
        "#,
    )
    .bind(&hash)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| {
        state.metrics.logout_total.with_label_values(&["failure", "db_error"]).inc();
        err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}"))
    })?;

    let user_id: Uuid = match row {
        Some(r) => r.get("user_id"),
        None => {
            state.metrics.logout_total.with_label_values(&["failure", "invalid"]).inc();
            return Err(err(StatusCode::UNAUTHORIZED, "invalid refresh token"));
        }
    };

    state.metrics.logout_total.with_label_values(&["success", "ok"]).inc();

    let envelope = EventEnvelope::new(subjects::AUTH_LOGOUT, events::LogoutData {})
        .with_user(user_id.to_string());
    if let Err(e) = state.events.publish(subjects::AUTH_LOGOUT, &envelope).await {
        state.metrics.publish_fail_total.with_label_values(&[subjects::AUTH_LOGOUT]).inc();
        tracing::warn!(user_id = %user_id, error = %e, "auth.logout publish failed");
    }

    Ok((StatusCode::OK, Json(OkResponse { ok: true })))
}

pub async fn me(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiErr> {
    let claims = bearer_claims(&state, &headers)?;
    let user_id =
        Uuid::parse_str(&claims.sub).map_err(|_| err(StatusCode::UNAUTHORIZED, "invalid token"))?;

    let row = sqlx::query(
        r#"
        SELECT id, email, full_name, role, is_active, is_verified, created_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}")))?
    .ok_or_else(|| err(StatusCode::NOT_FOUND, "user not found"))?;

    Ok((
        StatusCode::OK,
        Json(UserResponse {
            id: row.get("id"),
            email: row.get("email"),
            full_name: row.get("full_name"),
            role: row.get("role"),
            is_active: row.get("is_active"),
            is_verified: row.get("is_verified"),
            created_at: row.get("created_at"),
        }),
    ))
}

fn bearer_claims(state: &AuthState, headers: &HeaderMap) -> Result<super::jwt::AccessClaims, ApiErr> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "missing bearer token"))?;

    state
        .jwt
        .validate_access_token(token)
        .map_err(|_| err(StatusCode::UNAUTHORIZED, "invalid token"))
}
