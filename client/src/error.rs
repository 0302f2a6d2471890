use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("ledger endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP request to ledger failed: {0}")]
    RequestFailed(String),

    #[error("invalid response from ledger: {0}")]
    InvalidResponse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transaction {hash} not included after {attempts} attempts")]
    NotIncluded { hash: String, attempts: u32 },

    #[error("{0}")]
    Other(String),
}

impl ClientError {
    /// Map a transport-level `reqwest` error the same way for every request.
    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Unreachable(format!("request timed out: {e}"))
        } else if e.is_connect() {
            ClientError::Unreachable(format!("connection failed: {e}"))
        } else {
            ClientError::RequestFailed(e.to_string())
        }
    }
}
