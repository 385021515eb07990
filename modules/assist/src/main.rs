use assist_rs::chunking::Chunker;
use assist_rs::config::Config;
use assist_rs::providers::{ChatProvider, EmbeddingProvider, HttpChat, HttpEmbeddings};
use assist_rs::routes::{self, AssistState};
use assist_rs::use_cases::{IndexDocument, RagQuery};
use assist_rs::vector_store::{MemoryVectorStore, QdrantStore, VectorStore};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("starting assist service");

    let config = Config::from_env().expect("failed to load configuration");

    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(HttpEmbeddings::new(
        config.llm_base_url.clone(),
        config.llm_api_key.clone(),
        config.embeddings_model.clone(),
    ));
    let chat: Arc<dyn ChatProvider> = Arc::new(HttpChat::new(
        config.llm_base_url.clone(),
        config.llm_api_key.clone(),
        config.chat_model.clone(),
    ));

    let store: Arc<dyn VectorStore> = match config.vector_store.to_lowercase().as_str() {
        "memory" => {
            tracing::info!("using in-memory vector store");
            Arc::new(MemoryVectorStore::new())
        }
        "qdrant" => {
            tracing::info!(url = %config.qdrant_url, collection = %config.qdrant_collection, "using Qdrant");
            Arc::new(QdrantStore::new(
                config.qdrant_url.clone(),
                config.qdrant_collection.clone(),
            ))
        }
        other => panic!("invalid VECTOR_STORE: {other}, must be 'memory' or 'qdrant'"),
    };

    let state = Arc::new(AssistState {
        index: IndexDocument::new(
            Chunker::new(config.chunk_size, config.chunk_overlap),
            embeddings.clone(),
            store.clone(),
        ),
        query: RagQuery::new(embeddings, store, chat, config.top_k),
    });

    let app = routes::router(state).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    tracing::info!(%addr, "assist service listening");

    axum::serve(listener, app).await.expect("server failed");
}
