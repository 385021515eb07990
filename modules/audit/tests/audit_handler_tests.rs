//! Audit handler behavior against a real Postgres.
//!
//! Requires a database:
//!   DATABASE_URL=postgres://localhost/audit_test cargo test -p audit-rs -- --ignored

use audit_rs::handler::AuditEventHandler;
use event_bus::{EventEnvelope, JsonMap};
use event_consumer::{EventHandler, Outcome};
use serde_json::json;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

async fn setup() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");

    sqlx::query("DELETE FROM audit_logs").execute(&pool).await.ok();
    pool
}

fn envelope(event_type: &str, data: serde_json::Value) -> EventEnvelope<JsonMap> {
    let serde_json::Value::Object(map) = data else {
        panic!("payload must be an object");
    };
    EventEnvelope::new(event_type, map)
}

#[tokio::test]
#[serial]
#[ignore] // requires Postgres
async fn every_event_becomes_one_row() {
    let pool = setup().await;
    let handler = AuditEventHandler::new(pool.clone());

    let outcome = handler
        .handle(
            &envelope(
                "user.created",
                json!({ "id": "u1", "email": "a@b.com", "full_name": "A B" }),
            )
            .with_user("u1"),
        )
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Applied);

    let (event_type, user_id, resource_type, resource_id, action): (
        String,
        Option<String>,
        String,
        Option<String>,
        String,
    ) = sqlx::query_as(
        "SELECT event_type, user_id, resource_type, resource_id, action FROM audit_logs",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    assert_eq!(event_type, "user.created");
    assert_eq!(user_id.as_deref(), Some("u1"));
    assert_eq!(resource_type, "user");
    assert_eq!(resource_id.as_deref(), Some("u1"));
    assert_eq!(action, "created");
}

#[tokio::test]
#[serial]
#[ignore] // requires Postgres
async fn duplicate_delivery_is_skipped() {
    let pool = setup().await;
    let handler = AuditEventHandler::new(pool.clone());

    let event_id = Uuid::new_v4();
    let envelope = EventEnvelope::with_event_id(
        event_id,
        "auth.login",
        json!({ "email": "a@b.com" })
            .as_object()
            .cloned()
            .expect("object"),
    )
    .with_user("u1");

    assert_eq!(handler.handle(&envelope).await.unwrap(), Outcome::Applied);
    assert_eq!(handler.handle(&envelope).await.unwrap(), Outcome::Skipped);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_logs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[serial]
#[ignore] // requires Postgres
async fn metadata_keeps_the_open_payload() {
    let pool = setup().await;
    let handler = AuditEventHandler::new(pool.clone());

    handler
        .handle(&envelope(
            "auth.token_refreshed",
            json!({ "device": "cli", "count": 3 }),
        ))
        .await
        .unwrap();

    let (metadata,): (serde_json::Value,) =
        sqlx::query_as("SELECT metadata FROM audit_logs WHERE event_type = 'auth.token_refreshed'")
            .fetch_one(&pool)
            .await
            .unwrap();

    assert_eq!(metadata["device"], "cli");
    assert_eq!(metadata["count"], 3);
}
