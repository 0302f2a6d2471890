use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("secure random source unavailable: {0}")]
    Randomness(String),

    #[error("failed to encode transaction body: {0}")]
    Encoding(String),
}
