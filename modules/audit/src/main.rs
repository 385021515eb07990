use audit_rs::{config::Config, consumer, db, events, routes};
use axum::{routing::get, Router};
use event_bus::{EventBus, InMemoryBus, JetStreamBus};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("starting audit service");

    let config = Config::from_env().expect("failed to load configuration");

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("failed to connect to database");
    db::run_migrations(&pool).await.expect("failed to run migrations");

    let bus: Arc<dyn EventBus> = match config.bus_type.to_lowercase().as_str() {
        "inmemory" => {
            tracing::info!("using in-memory event bus");
            Arc::new(InMemoryBus::new())
        }
        "nats" => {
            tracing::info!(url = %config.nats_url, "connecting to NATS");
            let client = async_nats::connect(&config.nats_url)
                .await
                .expect("failed to connect to NATS");
            Arc::new(JetStreamBus::new(client))
        }
        other => panic!("invalid BUS_TYPE: {other}, must be 'inmemory' or 'nats'"),
    };

    events::ensure_exchanges(&bus)
        .await
        .expect("failed to declare exchanges");

    // handles must outlive the server or the consumers shut down
    let _consumers = consumer::start_consumers(bus, pool.clone());

    let app = Router::new()
        .route("/health", get(routes::health))
        .merge(routes::audit::router(Arc::new(pool)))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    tracing::info!(%addr, "audit service listening");

    axum::serve(listener, app).await.expect("server failed");
}
