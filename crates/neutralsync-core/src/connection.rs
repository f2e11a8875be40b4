//! Connection manager: the scheduler handle and the control server's lifetime
//!
//! At most one scheduler link exists per session. The link pairs the lazy
//! [`SchedulerClient`] with the cancellation token of the control server, so
//! clearing the link both disables outbound calls and stops the server loop
//! once its current session ends.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{RtiError, RtiResult};
use crate::remote::SchedulerClient;
use crate::rpc::{self, RequestHandler, RpcClientConfig, ServerHandle};

/// Result of [`ConnectionManager::connect`]
#[derive(Debug, Clone)]
pub enum Connect {
    /// A new handle was created
    Connected(SchedulerClient),
    /// A handle already existed and is returned unchanged
    AlreadyConnected(SchedulerClient),
}

impl Connect {
    /// The scheduler handle in either case
    pub fn client(&self) -> &SchedulerClient {
        match self {
            Self::Connected(client) | Self::AlreadyConnected(client) => client,
        }
    }
}

#[derive(Debug)]
struct Link {
    scheduler: SchedulerClient,
    shutdown: CancellationToken,
}

/// Owns the scheduler handle and the inbound server's stop token
#[derive(Debug)]
pub struct ConnectionManager {
    client_config: RpcClientConfig,
    link: Mutex<Option<Link>>,
}

impl ConnectionManager {
    /// Manager whose outbound connections are bounded by `connect_timeout`
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            client_config: RpcClientConfig {
                connect_timeout,
                response_timeout: None,
            },
            link: Mutex::new(None),
        }
    }

    /// Create the scheduler handle. Performs no network I/O.
    pub fn connect(&self, addr: SocketAddr) -> Connect {
        let mut link = self.link.lock();
        if let Some(existing) = link.as_ref() {
            info!(
                scheduler = %existing.scheduler.endpoint(),
                requested = %addr,
                "Already connected to a scheduler"
            );
            return Connect::AlreadyConnected(existing.scheduler.clone());
        }

        let scheduler = SchedulerClient::new(addr, self.client_config);
        *link = Some(Link {
            scheduler: scheduler.clone(),
            shutdown: CancellationToken::new(),
        });
        debug!(scheduler = %addr, "Scheduler handle created");
        Connect::Connected(scheduler)
    }

    /// Start the inbound server loop on `addr`.
    ///
    /// The loop lives until [`disconnect`](Self::disconnect). Fails with
    /// [`RtiError::NotConnected`] if there is no scheduler handle.
    pub async fn serve<H: RequestHandler>(
        &self,
        addr: SocketAddr,
        handler: Arc<H>,
    ) -> RtiResult<ServerHandle> {
        let shutdown = self
            .link
            .lock()
            .as_ref()
            .map(|link| link.shutdown.child_token())
            .ok_or(RtiError::NotConnected)?;
        rpc::spawn(addr, handler, shutdown).await
    }

    /// Drop the scheduler handle and stop the server loop.
    ///
    /// Returns whether a handle existed. Does not wait for the loop to exit.
    pub fn disconnect(&self) -> bool {
        match self.link.lock().take() {
            Some(link) => {
                link.shutdown.cancel();
                info!(scheduler = %link.scheduler.endpoint(), "Disconnected from scheduler");
                true
            }
            None => false,
        }
    }

    /// Token cancelled by the next [`disconnect`](Self::disconnect), if connected
    pub fn closed(&self) -> Option<CancellationToken> {
        self.link.lock().as_ref().map(|link| link.shutdown.clone())
    }

    /// Current scheduler handle, if connected
    pub fn scheduler(&self) -> Option<SchedulerClient> {
        self.link.lock().as_ref().map(|link| link.scheduler.clone())
    }

    /// Whether a scheduler handle exists
    pub fn is_connected(&self) -> bool {
        self.link.lock().is_some()
    }
}
