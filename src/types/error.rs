use thiserror::Error;

/// cloudcost error types
#[derive(Error, Debug)]
pub enum CloudCostError {
    /// Credentials, runtime or HTTP client could not be set up
    #[error("failed to create {provider} client: {reason}")]
    ClientConstruction { provider: String, reason: String },

    /// Billing query failed (SDK error, HTTP status, transport)
    #[error("query error: {0}")]
    Query(String),

    /// Provider response could not be interpreted at all
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Report could not be rendered
    #[error("render error: {0}")]
    Render(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CloudCostError {
    pub fn client(provider: &str, reason: impl ToString) -> Self {
        Self::ClientConstruction {
            provider: provider.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for cloudcost
pub type Result<T> = std::result::Result<T, CloudCostError>;
