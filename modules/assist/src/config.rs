use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    pub llm_base_url: String,
    pub llm_api_key: String,
    pub embeddings_model: String,
    pub chat_model: String,

    pub vector_store: String,
    pub qdrant_url: String,
    pub qdrant_collection: String,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT").unwrap_or_else(|_| "8004".to_string()).parse()?,

            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
            llm_api_key: env::var("LLM_API_KEY")?,
            embeddings_model: env::var("EMBEDDINGS_MODEL")
                .unwrap_or_else(|_| "nomic-embed-text-v1.5".to_string()),
            chat_model: env::var("CHAT_MODEL")
                .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string()),

            vector_store: env::var("VECTOR_STORE").unwrap_or_else(|_| "qdrant".to_string()),
            qdrant_url: env::var("QDRANT_URL")
                .unwrap_or_else(|_| "http://localhost:6333".to_string()),
            qdrant_collection: env::var("QDRANT_COLLECTION")
                .unwrap_or_else(|_| "documents".to_string()),

            chunk_size: env::var("CHUNK_SIZE").unwrap_or_else(|_| "500".to_string()).parse()?,
            chunk_overlap: env::var("CHUNK_OVERLAP").unwrap_or_else(|_| "50".to_string()).parse()?,
            top_k: env::var("TOP_K").unwrap_or_else(|_| "5".to_string()).parse()?,
        })
    }
}
