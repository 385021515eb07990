use auth_rs::{auth, config, db, events, metrics, middleware, routes};
use axum::{routing::get, Router};
use event_bus::{EventBus, EventPublisher, InMemoryBus, JetStreamBus};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,auth_rs=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cfg = config::Config::from_env()?;
    let metrics = metrics::Metrics::new();

    // DB + migrations (fail-fast)
    let pool = db::create_pool(&cfg.database_url).await?;
    db::run_migrations(&pool).await?;
    metrics.dep_up.with_label_values(&["db"]).set(1);

    // Event bus (fail-fast); the NATS client is kept for readiness checks
    let (bus, nats): (Arc<dyn EventBus>, Option<async_nats::Client>) =
        match cfg.bus_type.to_lowercase().as_str() {
            "inmemory" => {
                tracing::info!("using in-memory event bus");
                (Arc::new(InMemoryBus::new()), None)
            }
            "nats" => {
                tracing::info!(url = %cfg.nats_url, "connecting to NATS");
                let client = async_nats::connect(&cfg.nats_url).await?;
                metrics.dep_up.with_label_values(&["bus"]).set(1);
                (Arc::new(JetStreamBus::new(client.clone())), Some(client))
            }
            other => return Err(format!("invalid BUS_TYPE: {other}").into()),
        };

    events::ensure_exchanges(&bus).await?;

    let jwt = auth::jwt::JwtKeys::from_secret(&cfg.jwt_secret);
    let pwd = auth::password::PasswordPolicy {
        memory_kb: cfg.argon_memory_kb,
        iterations: cfg.argon_iterations,
        parallelism: cfg.argon_parallelism,
    };

    let auth_state = Arc::new(auth::handlers::AuthState {
        db: pool.clone(),
        jwt,
        pwd,
        access_ttl_minutes: cfg.access_token_ttl_minutes,
        refresh_ttl_days: cfg.refresh_token_ttl_days,
        events: EventPublisher::new(bus),
        metrics: metrics.clone(),
    });

    let health_state = Arc::new(routes::health::HealthState {
        db: pool,
        nats,
        metrics: metrics.clone(),
    });

    let metrics_state = Arc::new(routes::metrics::MetricsState { metrics });

    let app = Router::new()
        .route("/health/live", get(routes::health::health_live))
        .route("/health/ready", get(routes::health::health_ready))
        .with_state(health_state)
        .merge(
            Router::new()
                .route("/metrics", get(routes::metrics::metrics))
                .with_state(metrics_state),
        )
        .merge(routes::auth::router(auth_state))
        .layer(axum::middleware::from_fn(
            middleware::tracing::trace_id_middleware,
        ))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
