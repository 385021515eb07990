//! Projection idempotence against a real Postgres.
//!
//! Requires a database:
//!   DATABASE_URL=postgres://localhost/users_test cargo test -p users-rs -- --ignored

use event_bus::{EventEnvelope, JsonMap};
use event_consumer::{EventHandler, Outcome};
use serde_json::json;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use users_rs::consumer::UserProjectionHandler;
use uuid::Uuid;

async fn setup() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");

    sqlx::query("DELETE FROM users").execute(&pool).await.ok();
    sqlx::query("DELETE FROM dead_letter_events").execute(&pool).await.ok();
    pool
}

fn envelope(event_type: &str, data: serde_json::Value) -> EventEnvelope<JsonMap> {
    let serde_json::Value::Object(map) = data else {
        panic!("payload must be an object");
    };
    EventEnvelope::new(event_type, map)
}

fn created(id: Uuid) -> EventEnvelope<JsonMap> {
    envelope(
        "user.created",
        json!({ "id": id, "email": format!("{id}@example.com"), "full_name": "A B" }),
    )
}

async fn count_users(pool: &PgPool) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
        .unwrap();
    count
}

#[tokio::test]
#[serial]
#[ignore] // requires Postgres
async fn creation_applied_twice_yields_one_record() {
    let pool = setup().await;
    let handler = UserProjectionHandler::new(pool.clone());
    let id = Uuid::new_v4();

    let first = handler.handle(&created(id)).await.unwrap();
    assert_eq!(first, Outcome::Applied);

    let second = handler.handle(&created(id)).await.unwrap();
    assert_eq!(second, Outcome::Skipped);

    assert_eq!(count_users(&pool).await, 1);
}

#[tokio::test]
#[serial]
#[ignore] // requires Postgres
async fn same_email_different_id_is_treated_as_duplicate() {
    let pool = setup().await;
    let handler = UserProjectionHandler::new(pool.clone());

    let outcome = handler
        .handle(&envelope(
            "user.created",
            json!({ "id": Uuid::new_v4(), "email": "same@example.com", "full_name": "A" }),
        ))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Applied);

    // unique(email) violation maps to Skipped, never an error
    let outcome = handler
        .handle(&envelope(
            "user.created",
            json!({ "id": Uuid::new_v4(), "email": "same@example.com", "full_name": "B" }),
        ))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Skipped);

    assert_eq!(count_users(&pool).await, 1);
}

#[tokio::test]
#[serial]
#[ignore] // requires Postgres
async fn update_before_create_is_skipped_and_creates_nothing() {
    let pool = setup().await;
    let handler = UserProjectionHandler::new(pool.clone());

    let outcome = handler
        .handle(&envelope(
            "user.updated",
            json!({ "id": Uuid::new_v4(), "full_name": "Ghost" }),
        ))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Skipped);
    assert_eq!(count_users(&pool).await, 0);
}

#[tokio::test]
#[serial]
#[ignore] // requires Postgres
async fn partial_update_touches_only_present_fields() {
    let pool = setup().await;
    let handler = UserProjectionHandler::new(pool.clone());
    let id = Uuid::new_v4();

    handler
        .handle(&envelope(
            "user.created",
            json!({
                "id": id,
                "email": "keep@example.com",
                "full_name": "Before",
                "phone": "123",
                "department": "Ops"
            }),
        ))
        .await
        .unwrap();

    let outcome = handler
        .handle(&envelope(
            "user.updated",
            json!({ "id": id, "full_name": "After" }),
        ))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Applied);

    let (email, full_name, phone, department): (String, String, Option<String>, Option<String>) =
        sqlx::query_as(
            "SELECT email, full_name, phone, department FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();

    assert_eq!(full_name, "After");
    assert_eq!(email, "keep@example.com");
    assert_eq!(phone.as_deref(), Some("123"));
    assert_eq!(department.as_deref(), Some("Ops"));
}

#[tokio::test]
#[serial]
#[ignore] // requires Postgres
async fn delete_then_duplicate_delete_skips() {
    let pool = setup().await;
    let handler = UserProjectionHandler::new(pool.clone());
    let id = Uuid::new_v4();

    handler.handle(&created(id)).await.unwrap();

    let first = handler
        .handle(&envelope("user.deleted", json!({ "id": id })))
        .await
        .unwrap();
    assert_eq!(first, Outcome::Applied);

    let second = handler
        .handle(&envelope("user.deleted", json!({ "id": id })))
        .await
        .unwrap();
    assert_eq!(second, Outcome::Skipped);

    assert_eq!(count_users(&pool).await, 0);
}
