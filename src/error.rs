use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Failures of the resolve/fetch pipeline. None of them stop the sync loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtworkError {
    #[error("malformed track identity '{0}'")]
    MalformedIdentity(String),

    #[error("metadata lookup failed: {0}")]
    LookupFailed(#[from] HttpError),

    #[error("unexpected metadata response: {0}")]
    ParseFailed(String),

    #[error("no artwork found: {0}")]
    NotFound(String),

    #[error("failed to fetch artwork from {url}: {reason}")]
    ImageFetchFailed { url: String, reason: String },
}
