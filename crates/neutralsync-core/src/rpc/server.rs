//! Inbound JSON-RPC server loop
//!
//! The loop serves one session at a time: it accepts a connection, answers
//! every request on it in order until the peer closes or goes quiet for
//! [`SESSION_IDLE_TIMEOUT`], then goes back to accepting. Requests are never
//! handled in parallel.
//!
//! ```text
//!   bind ──► accept ──► read line ──► dispatch ──► write line ─┐
//!              ▲            ▲                                  │
//!              │            └──────────── more lines ──────────┘
//!              └──── peer closed (EOF) or idle ◄───────────────────
//!   shutdown token cancelled while waiting in accept ──► drop listener
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::message::{RpcError, RpcRequest, RpcResponse, MAX_FRAME_LEN};
use crate::error::RtiResult;

/// Pause after a failed `accept` before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// A session with no frame for this long is closed
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// One service exposed by a server, e.g. `rti` or `scheduler`
pub trait RequestHandler: Send + Sync + 'static {
    /// Service prefix this handler answers for
    fn service(&self) -> &'static str;

    /// Handle `method` (without the service prefix)
    fn handle(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send;
}

/// A running server loop
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the loop to stop after its current session
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait until the loop has exited and released the listener
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Server task ended abnormally");
        }
    }
}

/// Bind `addr` and run the server loop on a background task.
///
/// The listener is bound before this returns, so peers can connect as soon
/// as the caller proceeds. The loop stops when `shutdown` is cancelled.
pub async fn spawn<H: RequestHandler>(
    addr: SocketAddr,
    handler: Arc<H>,
    shutdown: CancellationToken,
) -> RtiResult<ServerHandle> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, service = handler.service(), "Server listening");

    let task = tokio::spawn(run(listener, handler, shutdown.clone()));

    Ok(ServerHandle {
        local_addr,
        shutdown,
        task,
    })
}

async fn run<H: RequestHandler>(listener: TcpListener, handler: Arc<H>, shutdown: CancellationToken) {
    let local_addr = listener.local_addr().ok();

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };

        debug!(%peer, "Session opened");
        match serve_session(stream, handler.as_ref(), SESSION_IDLE_TIMEOUT).await {
            Ok(handled) => debug!(%peer, handled, "Session closed"),
            Err(e) => warn!(%peer, error = %e, "Session ended with error"),
        }

        if shutdown.is_cancelled() {
            break;
        }
    }

    drop(listener);
    info!(addr = ?local_addr, service = handler.service(), "Server shutting down");
}

/// Answer every request on one connection until the peer closes it or
/// sends nothing for `idle_timeout`.
///
/// Returns the number of requests handled.
async fn serve_session<H: RequestHandler>(
    stream: TcpStream,
    handler: &H,
    idle_timeout: Duration,
) -> RtiResult<usize> {
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LEN));
    let mut handled = 0;

    loop {
        let line = match tokio::time::timeout(idle_timeout, framed.next()).await {
            Ok(Some(line)) => line?,
            Ok(None) => break,
            Err(_) => {
                debug!(after = ?idle_timeout, "Session idle, closing");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        if let Some(response) = dispatch(handler, &line).await {
            framed.send(response.to_line()?).await?;
        }
        handled += 1;
    }

    Ok(handled)
}

/// Decode one frame, run the handler, and build the response (if any)
pub(crate) async fn dispatch<H: RequestHandler>(handler: &H, line: &str) -> Option<RpcResponse> {
    let request = match RpcRequest::from_line(line) {
        Ok(request) => request,
        Err(error) => {
            warn!(error = %error, "Rejecting malformed request");
            return Some(RpcResponse::failure(Value::Null, error));
        }
    };

    let outcome = match request.service_and_method() {
        Some((service, method)) if service == handler.service() => {
            handler.handle(method, request.params.clone()).await
        }
        _ => Err(RpcError::method_not_found(&request.method)),
    };

    if let Err(error) = &outcome {
        debug!(method = %request.method, error = %error, "Request failed");
    }

    if request.is_notification() {
        return None;
    }
    let id = request.id.unwrap_or_default();
    Some(match outcome {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => RpcResponse::failure(id, error),
    })
}
