//! Client stub workers use to talk to the search server.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::warn;

use cinder_types::{CinderError, CinderResult, Request, Response};

/// Stateless stub for one search server.
///
/// Each call opens its own connection, so a client can sit idle across an
/// arbitrarily long external evaluation without pinning a server session.
/// Transport failures (connect refused, timeout) are retried a bounded
/// number of times; server refusals ([`CinderError::SearchExhausted`],
/// [`CinderError::InvalidKey`], [`CinderError::CapacityExceeded`]) are
/// surfaced immediately.
#[derive(Debug, Clone)]
pub struct SearchClient {
    addr: SocketAddr,
    key: String,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

impl SearchClient {
    pub fn new(addr: SocketAddr, key: impl Into<String>) -> Self {
        Self {
            addr,
            key: key.into(),
            timeout: Duration::from_secs(10),
            retries: 3,
            backoff: Duration::from_millis(200),
        }
    }

    /// Per-round-trip deadline covering connect, write, and read.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retries on top of the first attempt, with a fixed backoff between.
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    /// Request the next candidate token vector. Blocks (asynchronously)
    /// until the server answers.
    pub async fn next_tokens(&self) -> CinderResult<Vec<i64>> {
        let request = Request::Next {
            key: self.key.clone(),
        };
        match self.round_trip(&request).await? {
            Response::Tokens { tokens } => Ok(tokens),
            Response::Ack { .. } => Err(CinderError::Protocol(
                "expected tokens, got ack".to_string(),
            )),
            Response::Error { error, message } => Err(error.into_error(message)),
        }
    }

    /// Report the reward observed for exactly `tokens`. Returns once the
    /// server has folded the observation in.
    pub async fn update(&self, tokens: &[i64], reward: f64) -> CinderResult<()> {
        let request = Request::Update {
            key: self.key.clone(),
            tokens: tokens.to_vec(),
            reward,
        };
        match self.round_trip(&request).await? {
            Response::Ack { .. } => Ok(()),
            Response::Tokens { .. } => Err(CinderError::Protocol(
                "expected ack, got tokens".to_string(),
            )),
            Response::Error { error, message } => Err(error.into_error(message)),
        }
    }

    async fn round_trip(&self, request: &Request) -> CinderResult<Response> {
        let mut attempt = 0;
        loop {
            match self.round_trip_once(request).await {
                Ok(response) => return Ok(response),
                Err(err @ (CinderError::ConnectionFailure(_) | CinderError::Timeout { .. }))
                    if attempt < self.retries =>
                {
                    attempt += 1;
                    warn!(error = %err, attempt, max = self.retries, "request failed; retrying");
                    tokio::time::sleep(self.backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn round_trip_once(&self, request: &Request) -> CinderResult<Response> {
        let io = async {
            let stream = TcpStream::connect(self.addr).await?;
            let mut stream = BufReader::new(stream);

            let mut frame = serde_json::to_vec(request)?;
            frame.push(b'\n');
            stream.write_all(&frame).await?;
            stream.flush().await?;

            let mut line = String::new();
            if stream.read_line(&mut line).await? == 0 {
                return Err(CinderError::Protocol(
                    "server closed the connection".to_string(),
                ));
            }
            Ok(serde_json::from_str(&line)?)
        };
        match timeout(self.timeout, io).await {
            Ok(result) => result,
            Err(_) => Err(CinderError::Timeout {
                waited_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}
