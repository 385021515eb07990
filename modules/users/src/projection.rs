//! Idempotent application of user events to the local store.
//!
//! The identity key is the id assigned by the origin service. Creation
//! relies on `ON CONFLICT DO NOTHING` over the primary key, updates touch
//! only the fields present in the payload (COALESCE), and an update or
//! delete for an identity that never arrived is a skip, not an error: it
//! can simply mean out-of-order delivery.

use chrono::{DateTime, Utc};
use event_consumer::Outcome;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UserCreatedData {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UserUpdatedData {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UserDeletedData {
    pub id: Uuid,
}

pub async fn apply_user_created(
    db: &PgPool,
    data: &UserCreatedData,
) -> Result<Outcome, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (id, email, full_name, role, phone, department, is_active, is_verified, created_at, updated_at)
        VALUES ($1, $2, $3, COALESCE($4, 'user'), $5, $6, COALESCE($7, TRUE), COALESCE($8, FALSE), COALESCE($9, NOW()), NOW())
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(data.id)
    .bind(&data.email)
    .bind(&data.full_name)
    .bind(&data.role)
    .bind(&data.phone)
    .bind(&data.department)
    .bind(data.is_active)
    .bind(data.is_verified)
    .bind(data.created_at)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        tracing::debug!(user_id = %data.id, "user already projected, skipping");
        Ok(Outcome::Skipped)
    } else {
        tracing::info!(user_id = %data.id, email = %data.email, "user projected");
        Ok(Outcome::Applied)
    }
}

pub async fn apply_user_updated(
    db: &PgPool,
    data: &UserUpdatedData,
) -> Result<Outcome, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET email = COALESCE($2, email),
            full_name = COALESCE($3, full_name),
            role = COALESCE($4, role),
            phone = COALESCE($5, phone),
            department = COALESCE($6, department),
            is_active = COALESCE($7, is_active),
            is_verified = COALESCE($8, is_verified),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(data.id)
    .bind(&data.email)
    .bind(&data.full_name)
    .bind(&data.role)
    .bind(&data.phone)
    .bind(&data.department)
    .bind(data.is_active)
    .bind(data.is_verified)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        tracing::warn!(user_id = %data.id, "update for unknown user, skipping (possibly out of order)");
        Ok(Outcome::Skipped)
    } else {
        Ok(Outcome::Applied)
    }
}

pub async fn apply_user_deleted(
    db: &PgPool,
    data: &UserDeletedData,
) -> Result<Outcome, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(data.id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        tracing::warn!(user_id = %data.id, "delete for unknown user, skipping");
        Ok(Outcome::Skipped)
    } else {
        tracing::info!(user_id = %data.id, "user projection deleted");
        Ok(Outcome::Applied)
    }
}
