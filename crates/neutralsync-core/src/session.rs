//! Per-run synchronization context
//!
//! A [`SyncSession`] owns everything one test run needs: the component
//! registry, the scheduler connection, the start flag and the connection
//! state. Nothing is process-global, so independent runs (or tests) can
//! coexist in one process.
//!
//! ```text
//! SyncSession ─► SessionInner
//!                ├── registry:   Arc<ComponentRegistry>  ◄── ExecutorControl (rti.load/execute)
//!                ├── connection: Arc<ConnectionManager>  ◄── InjectionNotifier
//!                ├── shared:     SharedState             ◄── ExecutorControl (rti.start)
//!                ├── endpoint:   Arc<TestControlEndpoint<ExecutorControl>>
//!                └── server:     Option<ServerHandle>
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::component::ComponentCatalog;
use crate::config::{ConfigProvider, SessionOptions};
use crate::connection::ConnectionManager;
use crate::control::ExecutorControl;
use crate::handshake::{self, ConnectionState, HandshakeOutcome, SharedState, StartSignal};
use crate::notifier::{InjectionNotifier, NotifyOutcome};
use crate::registry::ComponentRegistry;
use crate::remote::TestControlEndpoint;
use crate::rpc::ServerHandle;

#[derive(Debug)]
pub(crate) struct SessionInner {
    pub(crate) options: SessionOptions,
    pub(crate) registry: Arc<ComponentRegistry>,
    pub(crate) connection: Arc<ConnectionManager>,
    pub(crate) shared: SharedState,
    pub(crate) endpoint: Arc<TestControlEndpoint<ExecutorControl>>,
    server: Mutex<Option<ServerHandle>>,
}

impl SessionInner {
    pub(crate) fn store_server(&self, server: ServerHandle) {
        *self.server.lock() = Some(server);
    }
}

/// Synchronization context for one test run. Clones share the same run.
#[derive(Debug, Clone)]
pub struct SyncSession {
    inner: Arc<SessionInner>,
}

impl SyncSession {
    /// New, unconfigured session loading components through `catalog`
    pub fn new(catalog: ComponentCatalog, options: SessionOptions) -> Self {
        let registry = Arc::new(ComponentRegistry::new(catalog));
        let shared = SharedState::new();
        let control = ExecutorControl::new(registry.clone(), shared.clone());

        Self {
            inner: Arc::new(SessionInner {
                connection: Arc::new(ConnectionManager::new(options.connect_timeout)),
                options,
                registry,
                shared,
                endpoint: Arc::new(TestControlEndpoint::new(Arc::new(control))),
                server: Mutex::new(None),
            }),
        }
    }

    /// Read the ports from `config` and synchronize with the scheduler.
    ///
    /// Never fails: every problem ends in [`ConnectionState::Disabled`] or,
    /// if `start()` does not arrive in time, returns with `started == false`.
    /// Only the first call does anything; later calls return the current
    /// outcome.
    pub async fn handshake(&self, config: &dyn ConfigProvider) -> HandshakeOutcome {
        handshake::run(&self.inner, config).await
    }

    /// Notifier bound to this session
    pub fn notifier(&self) -> InjectionNotifier {
        InjectionNotifier::new(self.inner.connection.clone(), self.inner.registry.clone())
    }

    /// Shorthand for `self.notifier().notify(action)`
    pub async fn notify(&self, action: &str) -> NotifyOutcome {
        self.notifier().notify(action).await
    }

    /// The session's component registry
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.inner.registry
    }

    /// The session's connection manager
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.inner.connection
    }

    /// Options the session was created with
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.get()
    }

    /// The start flag set by the scheduler's `start()`
    pub fn start_signal(&self) -> &StartSignal {
        self.inner.shared.start_signal()
    }

    /// Whether `start()` has arrived
    pub fn is_started(&self) -> bool {
        self.start_signal().is_set()
    }

    /// Address the control server is listening on, if it was started
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.inner.server.lock().as_ref().map(ServerHandle::local_addr)
    }

    /// Drop the scheduler handle and stop the control server.
    ///
    /// The session stays [`ConnectionState::Disabled`] from here on. A
    /// handshake waiting for `start()` returns at once. Returns without
    /// waiting for the server loop.
    pub fn disconnect(&self) {
        self.inner.connection.disconnect();
        self.inner.shared.set(ConnectionState::Disabled);
    }

    /// [`disconnect`](Self::disconnect) and wait for the server loop to exit
    pub async fn shutdown(&self) {
        self.disconnect();
        let server = self.inner.server.lock().take();
        if let Some(server) = server {
            debug!(addr = %server.local_addr(), "Waiting for control server to exit");
            server.join().await;
        }
    }
}
