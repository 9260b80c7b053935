/// Errors surfaced by the data-access layer.
///
/// `Clone` because one fetch result is shared by every consumer of a
/// cache key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("node transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    /// `true` for lookups the node answered with "absent" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Failures of a single HTTP round trip to the explorer node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or the body could not be read.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The node answered with a non-2xx status.
    #[error("node returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The body was not JSON, or did not have the expected shape.
    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_displays_bare_message() {
        let err = CoreError::NotFound("Block not found".to_owned());
        assert_eq!(err.to_string(), "Block not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn status_error_keeps_code_and_body() {
        let err: CoreError = TransportError::Status {
            status: 502,
            body: "bad gateway".to_owned(),
        }
        .into();
        assert!(!err.is_not_found());
        assert_eq!(
            err.to_string(),
            "node transport failure: node returned HTTP 502: bad gateway"
        );
    }
}
