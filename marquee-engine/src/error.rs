use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed script reply: {0}")]
    Reply(#[from] serde_json::Error),
}
