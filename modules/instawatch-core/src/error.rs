/// Result type alias for polling operations.
pub type Result<T> = std::result::Result<T, PollError>;

/// Every failure here degrades to "skip this sweep, try again next cycle".
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Request returned status {status} ({})", error_type.as_deref().unwrap_or("unclassified"))]
    HttpStatus {
        status: u16,
        error_type: Option<String>,
        message: Option<String>,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Watermark unavailable for query: {0}")]
    WatermarkUnavailable(String),

    #[error("Unknown subscription: {0}")]
    UnknownSubscription(u64),

    #[error("Could not resolve query: {0}")]
    Resolution(String),

    #[error("Event sink rejected batch: {0}")]
    Sink(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Poller stopped")]
    Stopped,
}

impl PollError {
    /// Whether this failure means the query should be skipped rather than retried.
    ///
    /// Only 400 responses whose `meta.error_type` is in `skip_error_types` qualify.
    pub fn is_skippable(&self, skip_error_types: &[String]) -> bool {
        match self {
            PollError::HttpStatus {
                status: 400,
                error_type: Some(kind),
                ..
            } => skip_error_types.iter().any(|t| t == kind),
            _ => false,
        }
    }
}
