use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookmeetError {
    #[error("Location not found")]
    LocationNotFound(),
    #[error("User not found")]
    UserNotFound(),
    #[error("No address registered; use `home <address>` first")]
    MissingAddress(),
    #[error("Malformed response from {0}")]
    MalformedResponse(&'static str),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Errors that abort a ranking call. Per-candidate failures never surface
/// here; they end up in the result's diagnostics instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RankError {
    #[error("Reference address {address:?} could not be resolved")]
    ReferenceUnresolvable { address: String },
    #[error("All {attempts} outbound requests failed at the transport layer")]
    TransportExhausted { attempts: usize },
    #[error("Top-N must be at least 1, got {0}")]
    InvalidTopN(usize),
    #[error("Search was cancelled")]
    Cancelled,
}
