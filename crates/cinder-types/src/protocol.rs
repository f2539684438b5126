//! Wire protocol for the search service.
//!
//! One JSON object per line over a TCP stream. Requests and responses are
//! tagged enum types rather than loose dictionaries so every error condition
//! the server can report is a first-class, matchable value.

use serde::{Deserialize, Serialize};

use crate::errors::CinderError;

/// A request from a worker to the search server.
///
/// Every request carries the namespace key it is scoped by. An `Update`
/// always names the exact token vector it scores, never an implicit "last
/// issued" reference, since many workers hold outstanding proposals at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "UPPERCASE")]
pub enum Request {
    Next {
        key: String,
    },
    Update {
        key: String,
        tokens: Vec<i64>,
        reward: f64,
    },
}

/// A response from the search server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// Answer to `NEXT`: the candidate token vector to evaluate.
    Tokens { tokens: Vec<i64> },
    /// Answer to `UPDATE`: the observation was folded into the search state.
    Ack { ack: bool },
    /// The request was refused.
    Error { error: ErrorKind, message: String },
}

/// Remotely-observable error kinds, mirrored into [`CinderError`] on the
/// client side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SearchExhausted,
    CapacityExceeded,
    InvalidKey,
    BadRequest,
}

impl Response {
    pub fn ack() -> Self {
        Self::Ack { ack: true }
    }

    /// Encode a server-side failure for the wire.
    pub fn error(err: &CinderError) -> Self {
        let (kind, message) = match err {
            CinderError::SearchExhausted(m) => (ErrorKind::SearchExhausted, m.clone()),
            CinderError::CapacityExceeded(m) => (ErrorKind::CapacityExceeded, m.clone()),
            CinderError::InvalidKey(m) => (ErrorKind::InvalidKey, m.clone()),
            other => (ErrorKind::BadRequest, other.to_string()),
        };
        Self::Error {
            error: kind,
            message,
        }
    }
}

impl ErrorKind {
    /// Rehydrate a wire error into the caller-facing error type.
    pub fn into_error(self, message: String) -> CinderError {
        match self {
            Self::SearchExhausted => CinderError::SearchExhausted(message),
            Self::CapacityExceeded => CinderError::CapacityExceeded(message),
            Self::InvalidKey => CinderError::InvalidKey(message),
            Self::BadRequest => CinderError::Protocol(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_request_wire_shape() {
        let json = serde_json::to_value(Request::Next {
            key: "cinder".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"op": "NEXT", "key": "cinder"}));
    }

    #[test]
    fn update_request_wire_shape() {
        let json = serde_json::to_value(Request::Update {
            key: "cinder".into(),
            tokens: vec![30, 45],
            reward: 0.91,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "op": "UPDATE",
                "key": "cinder",
                "tokens": [30, 45],
                "reward": 0.91
            })
        );
    }

    #[test]
    fn responses_round_trip() {
        for response in [
            Response::Tokens {
                tokens: vec![1, 2, 3],
            },
            Response::ack(),
            Response::Error {
                error: ErrorKind::SearchExhausted,
                message: "300 of 300 steps taken".into(),
            },
        ] {
            let json = serde_json::to_string(&response).unwrap();
            let back: Response = serde_json::from_str(&json).unwrap();
            assert_eq!(response, back);
        }
    }

    #[test]
    fn error_mapping_round_trips_kind() {
        let err = CinderError::SearchExhausted("10 of 10 steps taken".into());
        let Response::Error { error, message } = Response::error(&err) else {
            panic!("expected error response");
        };
        assert_eq!(error, ErrorKind::SearchExhausted);
        assert!(matches!(
            error.into_error(message),
            CinderError::SearchExhausted(_)
        ));
    }

    #[test]
    fn unexpected_server_failure_maps_to_bad_request() {
        let err = CinderError::Config("bad".into());
        let Response::Error { error, .. } = Response::error(&err) else {
            panic!("expected error response");
        };
        assert_eq!(error, ErrorKind::BadRequest);
    }
}
