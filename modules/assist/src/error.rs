#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("vector store error: {0}")]
    Store(String),
}

pub type AssistResult<T> = Result<T, AssistError>;
