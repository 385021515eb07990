use axum::{routing::get, Router};
use event_bus::{EventBus, EventPublisher, InMemoryBus, JetStreamBus};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use users_rs::{config::Config, consumer, db, events, jwt::JwtValidator, routes};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("starting users service");

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

    // keep the handle alive for the lifetime of the process
    let _projection = consumer::start_projection_consumer(bus.clone(), pool.clone());

    let state = Arc::new(routes::users::UsersState {
        db: pool,
        events: EventPublisher::new(bus),
        jwt: JwtValidator::from_secret(&config.jwt_secret),
    });

    let app = Router::new()
        .route("/health", get(routes::health))
        .merge(routes::users::router(state))
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
    tracing::info!(%addr, "users service listening");

    axum::serve(listener, app).await.expect("server failed");
}
