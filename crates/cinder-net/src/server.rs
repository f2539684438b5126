//! TCP search server: owns the controller, serializes access to it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex, Semaphore};
use tracing::{debug, info, warn};

use cinder_search::{Observation, SaController};
use cinder_types::{CinderError, CinderResult, Request, Response};

/// Configuration for the search server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind. Empty resolves the local outbound interface address.
    pub host: String,
    /// Port to bind. Zero picks an ephemeral port.
    pub port: u16,
    /// Cap on concurrent client sessions.
    pub max_client_num: usize,
    /// Global budget of accepted observations; `NEXT` is refused once reached.
    pub search_steps: u64,
    /// Namespace key requests must present.
    pub key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            max_client_num: 10,
            search_steps: 300,
            key: "cinder".to_string(),
        }
    }
}

/// State every connection funnels into: the controller and the step counter
/// live under one lock so no two operations can interleave.
struct SearchState {
    controller: SaController,
    steps: u64,
    proposals: u64,
}

struct Shared {
    state: Mutex<SearchState>,
    sessions: Semaphore,
    config: ServerConfig,
}

/// A running search server.
///
/// Owns exactly one [`SaController`] for its process lifetime. All search
/// state is in-memory: a restart discards the current point, temperature,
/// and history. Dropping the server (or calling [`stop`](Self::stop)) shuts
/// the accept loop down; reaching the step budget only refuses `NEXT`.
pub struct SearchServer {
    shared: Arc<Shared>,
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl SearchServer {
    /// Bind and start accepting connections. Returns once the listener is
    /// live; the accept loop runs on a background task.
    pub async fn start(config: ServerConfig, controller: SaController) -> CinderResult<Self> {
        let host: IpAddr = if config.host.is_empty() {
            local_ip()
        } else {
            config
                .host
                .parse()
                .map_err(|_| CinderError::Config(format!("unparseable host {:?}", config.host)))?
        };
        let listener = TcpListener::bind((host, config.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, key = %config.key, steps = config.search_steps, "search server listening");

        let shared = Arc::new(Shared {
            state: Mutex::new(SearchState {
                controller,
                steps: 0,
                proposals: 0,
            }),
            sessions: Semaphore::new(config.max_client_num),
            config,
        });
        let (shutdown, rx) = oneshot::channel();
        tokio::spawn(accept_loop(listener, shared.clone(), rx));

        Ok(Self {
            shared,
            addr,
            shutdown: Some(shutdown),
        })
    }

    /// The bound address, for co-located clients to self-configure from.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accepted observations so far.
    pub async fn steps(&self) -> u64 {
        self.shared.state.lock().await.steps
    }

    /// Proposals served so far.
    pub async fn proposals(&self) -> u64 {
        self.shared.state.lock().await.proposals
    }

    /// Snapshot of the controller's observation history, in arrival order.
    pub async fn history(&self) -> Vec<Observation> {
        self.shared.state.lock().await.controller.history().to_vec()
    }

    /// Best tokens and reward observed so far.
    pub async fn best(&self) -> Option<(Vec<i64>, f64)> {
        let state = self.shared.state.lock().await;
        state
            .controller
            .best()
            .map(|(tokens, reward)| (tokens.to_vec(), reward))
    }

    /// Stop accepting connections. In-flight requests run to completion.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for SearchServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("search server stopping");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                let shared = shared.clone();
                tokio::spawn(handle_connection(stream, peer, shared));
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    let permit = match shared.sessions.try_acquire() {
        Ok(permit) => permit,
        Err(_) => {
            warn!(%peer, max = shared.config.max_client_num, "rejecting connection: at capacity");
            let err = CinderError::CapacityExceeded(format!(
                "{} clients already connected",
                shared.config.max_client_num
            ));
            let _ = write_response(&mut stream, &Response::error(&err)).await;
            return;
        }
    };
    debug!(%peer, "client connected");

    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(%peer, error = %err, "read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let response = dispatch(&shared, request).await;
                if let Err(err) = write_response(&mut write, &response).await {
                    warn!(%peer, error = %err, "write failed");
                    break;
                }
            }
            Err(err) => {
                // A peer speaking the wrong protocol gets one answer, then
                // the connection is dropped.
                warn!(%peer, error = %err, "malformed request frame");
                let response = Response::error(&CinderError::Protocol(err.to_string()));
                let _ = write_response(&mut write, &response).await;
                break;
            }
        }
    }

    drop(permit);
    debug!(%peer, "client disconnected");
}

async fn dispatch(shared: &Shared, request: Request) -> Response {
    match request {
        Request::Next { key } => {
            if key != shared.config.key {
                return Response::error(&CinderError::InvalidKey(key));
            }
            let mut state = shared.state.lock().await;
            if state.steps >= shared.config.search_steps {
                info!(steps = state.steps, "budget exhausted; refusing proposal");
                return Response::error(&CinderError::SearchExhausted(format!(
                    "{} of {} steps taken",
                    state.steps, shared.config.search_steps
                )));
            }
            let tokens = state.controller.propose();
            state.proposals += 1;
            debug!(proposal = state.proposals, "proposal served");
            Response::Tokens { tokens }
        }
        Request::Update {
            key,
            tokens,
            reward,
        } => {
            if key != shared.config.key {
                return Response::error(&CinderError::InvalidKey(key));
            }
            let mut state = shared.state.lock().await;
            match state.controller.observe(tokens, reward) {
                Ok(()) => {
                    // Still counted after the budget is reached: outstanding
                    // proposals from slow workers are never dropped.
                    state.steps += 1;
                    debug!(steps = state.steps, reward, "observation folded");
                    Response::ack()
                }
                Err(err) => Response::error(&err),
            }
        }
    }
}

async fn write_response<W>(write: &mut W, response: &Response) -> CinderResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = serde_json::to_vec(response)?;
    frame.push(b'\n');
    write.write_all(&frame).await?;
    write.flush().await?;
    Ok(())
}

/// Resolve the local outbound interface address without sending traffic: a
/// UDP socket "connected" to a public address reveals which interface the
/// OS would route through.
fn local_ip() -> IpAddr {
    UdpSocket::bind(("0.0.0.0", 0))
        .and_then(|socket| {
            socket.connect(("8.8.8.8", 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
