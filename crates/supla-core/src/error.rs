//! Error types for polling and extraction.

/// Why polling a single device did not produce an online record.
///
/// Every variant is recovered at the device level: it becomes the `up`/`state`
/// of that device's record and never escapes the cycle.
#[derive(thiserror::Error, Debug)]
pub enum PollFailure {
    /// Connection refused, DNS failure or timeout before any response.
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("HTTP 401 unauthorized")]
    Unauthorized,

    #[error("HTTP 403 forbidden")]
    Forbidden,

    #[error("HTTP 404 not found")]
    NotFound,

    #[error("HTTP 500 internal server error")]
    ServerError,

    /// Any status other than 200, 401, 403, 404 and 500.
    #[error("HTTP status {0}")]
    Status(u16),

    /// The body of a 200 response could not be read.
    #[error("body read failure: {0}")]
    BodyRead(String),

    #[error("extraction failure: {0}")]
    Extraction(#[from] ExtractError),
}

impl PollFailure {
    /// Classify a non-200 status code.
    pub fn from_status(code: u16) -> Self {
        match code {
            401 => PollFailure::Unauthorized,
            403 => PollFailure::Forbidden,
            404 => PollFailure::NotFound,
            500 => PollFailure::ServerError,
            other => PollFailure::Status(other),
        }
    }
}

/// A 200 page whose content could not be turned into fields.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("binary content in page body at byte {offset}")]
    BinaryContent { offset: usize },
}

/// Errors raised while constructing the fetch pipeline.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid CSS selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },
}
