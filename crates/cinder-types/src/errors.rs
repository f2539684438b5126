use thiserror::Error;

/// Main error type for the Cinder system.
///
/// Every failure a caller can hit is a distinct variant so it can be matched
/// on directly; the wire protocol mirrors the remotely-observable subset in
/// [`crate::protocol::ErrorKind`].
#[derive(Error, Debug)]
pub enum CinderError {
    #[error("invalid bounds at dimension {dim}: min {min} exceeds max {max}")]
    InvalidBounds { dim: usize, min: f64, max: f64 },

    #[error("token {token} at dimension {dim} outside range {min}..={max}")]
    OutOfRange {
        dim: usize,
        token: i64,
        min: i64,
        max: i64,
    },

    #[error("connection failure: {0}")]
    ConnectionFailure(#[from] std::io::Error),

    #[error("request timed out after {waited_ms} ms")]
    Timeout { waited_ms: u64 },

    #[error("server at capacity: {0}")]
    CapacityExceeded(String),

    #[error("search budget exhausted: {0}")]
    SearchExhausted(String),

    #[error("invalid namespace key: {0}")]
    InvalidKey(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for Cinder operations.
pub type CinderResult<T> = Result<T, CinderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_bounds_display_names_dimension() {
        let err = CinderError::InvalidBounds {
            dim: 3,
            min: 0.5,
            max: 0.2,
        };
        let text = err.to_string();
        assert!(text.contains("dimension 3"));
        assert!(text.contains("0.5"));
    }

    #[test]
    fn out_of_range_display_names_token_and_bounds() {
        let err = CinderError::OutOfRange {
            dim: 1,
            token: 95,
            min: 0,
            max: 90,
        };
        let text = err.to_string();
        assert!(text.contains("token 95"));
        assert!(text.contains("0..=90"));
        assert!(!text.contains("exceeds"));
    }

    #[test]
    fn io_error_converts_to_connection_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: CinderError = io.into();
        assert!(matches!(err, CinderError::ConnectionFailure(_)));
    }
}
