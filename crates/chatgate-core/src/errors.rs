/// Core error type for the gateway.
///
/// Adapter crates map their specific errors into this type so the HTTP layer
/// can decide consistently between a client-facing rejection and a server fault.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("token limit reached; replenish tokens to continue chatting")]
    QuotaExceeded,

    #[error("invalid telegram authentication")]
    InvalidSignature,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the caller can fix the failure by changing its request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::QuotaExceeded
                | Error::InvalidSignature
                | Error::InvalidArgument(_)
                | Error::NotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
