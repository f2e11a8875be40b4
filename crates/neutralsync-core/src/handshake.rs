//! Startup handshake between executor and scheduler
//!
//! ```text
//!                 ports missing/invalid
//!  Unconfigured ─────────────────────────────────────────► Disabled
//!       │                                                    ▲  ▲
//!       │ ports ok                      bind or ready() fails │  │ disconnect()
//!       ▼                                                    │  │
//!   Connecting ──────────────────────────────────────────────┘  │
//!       │ ready() ok                                            │
//!       ▼                                                       │
//!  AwaitingStart ── start() ──► Started ────────────────────────┘
//!       │
//!       └─ no start() within the bound: handshake returns started=false,
//!          state stays AwaitingStart until a late start() arrives
//! ```
//!
//! The wait blocks the caller only. `start()` is delivered by the control
//! server, which runs on its own task.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ConfigProvider, SyncPorts};
use crate::connection::Connect;
use crate::session::SessionInner;

/// Where an executor is in its synchronization lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No handshake attempted yet
    Unconfigured,
    /// Ports read; control server starting and `ready()` in flight
    Connecting,
    /// Scheduler acknowledged `ready()`; waiting for `start()`
    AwaitingStart,
    /// Scheduler sent `start()`
    Started,
    /// Synchronization is off for the rest of the run
    Disabled,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unconfigured => "unconfigured",
            Self::Connecting => "connecting",
            Self::AwaitingStart => "awaiting-start",
            Self::Started => "started",
            Self::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Result of [`SyncSession::handshake`](crate::SyncSession::handshake)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeOutcome {
    /// State when the handshake returned
    pub state: ConnectionState,
    /// Whether `start()` had arrived
    pub started: bool,
}

/// One-shot flag raised by the scheduler's `start()`
#[derive(Debug, Clone)]
pub struct StartSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StartSignal {
    /// An unset signal
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the flag and wake every waiter
    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the flag is raised
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the flag is raised, at most `timeout`.
    ///
    /// Returns immediately if it already is.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        let raised = tokio::time::timeout(timeout, rx.wait_for(|set| *set)).await;
        matches!(raised, Ok(Ok(_)))
    }
}

impl Default for StartSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// State and start flag, shared by the session and its control server
#[derive(Debug, Clone)]
pub(crate) struct SharedState {
    state: Arc<Mutex<ConnectionState>>,
    start: StartSignal,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnectionState::Unconfigured)),
            start: StartSignal::new(),
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub(crate) fn start_signal(&self) -> &StartSignal {
        &self.start
    }

    pub(crate) fn set(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(from = %*state, to = %next, "Connection state changed");
            *state = next;
        }
    }

    /// Move `from → to`; false (and no change) if the state is not `from`
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if *state != from {
            return false;
        }
        debug!(from = %from, to = %to, "Connection state changed");
        *state = to;
        true
    }

    pub(crate) fn outcome(&self) -> HandshakeOutcome {
        HandshakeOutcome {
            state: self.get(),
            started: self.start.is_set(),
        }
    }

    /// `start()` from the scheduler
    pub(crate) fn mark_started(&self) {
        self.start.set();
        if self.transition(ConnectionState::AwaitingStart, ConnectionState::Started) {
            info!("Scheduler started the run");
        } else {
            debug!(state = %self.get(), "Start signal recorded");
        }
    }
}

/// Drive one session from `Unconfigured` to a settled state.
pub(crate) async fn run(session: &SessionInner, config: &dyn ConfigProvider) -> HandshakeOutcome {
    let shared = &session.shared;
    let ports = SyncPorts::from_config(config);

    {
        let mut state = shared.state.lock();
        if *state != ConnectionState::Unconfigured {
            info!(state = %*state, "Handshake already performed, ignoring");
            drop(state);
            return shared.outcome();
        }
        *state = match ports {
            Ok(_) => ConnectionState::Connecting,
            Err(_) => ConnectionState::Disabled,
        };
    }

    let ports = match ports {
        Ok(ports) => ports,
        Err(e @ ConfigError::Missing(_)) => {
            info!(reason = %e, "No scheduler configured, synchronization disabled");
            return shared.outcome();
        }
        Err(e) => {
            warn!(error = %e, "Bad scheduler configuration, synchronization disabled");
            return shared.outcome();
        }
    };

    let options = &session.options;
    let scheduler_addr = SocketAddr::new(options.host_addr, ports.host);
    let listen_addr = SocketAddr::new(options.listen_addr, ports.emulator);
    info!(scheduler = %scheduler_addr, listen = %listen_addr, "Connecting to scheduler");

    let scheduler = match session.connection.connect(scheduler_addr) {
        Connect::Connected(client) | Connect::AlreadyConnected(client) => client,
    };

    match session.connection.serve(listen_addr, session.endpoint.clone()).await {
        Ok(server) => session.store_server(server),
        Err(e) => {
            warn!(addr = %listen_addr, error = %e, "Control server failed to start, synchronization disabled");
            return disable(session);
        }
    }

    if let Err(e) = scheduler.ready(options.ready_timeout).await {
        warn!(scheduler = %scheduler_addr, error = %e, "Scheduler ready() failed, synchronization disabled");
        return disable(session);
    }

    let Some(closed) = session.connection.closed() else {
        // Disconnected while ready() was in flight
        return shared.outcome();
    };
    if !shared.transition(ConnectionState::Connecting, ConnectionState::AwaitingStart) {
        return shared.outcome();
    }
    debug!(timeout = ?options.start_timeout, "Waiting for start signal");

    tokio::select! {
        started = shared.start.wait(options.start_timeout) => {
            if started {
                if shared.transition(ConnectionState::AwaitingStart, ConnectionState::Started) {
                    info!("Scheduler started the run");
                }
            } else {
                warn!(
                    after = ?options.start_timeout,
                    "Scheduler did not send start in time, continuing without it"
                );
            }
        }
        _ = closed.cancelled() => {
            info!("Disconnected while waiting for start");
            shared.set(ConnectionState::Disabled);
        }
    }

    shared.outcome()
}

fn disable(session: &SessionInner) -> HandshakeOutcome {
    session.connection.disconnect();
    session.shared.set(ConnectionState::Disabled);
    session.shared.outcome()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_at_bound() {
        let signal = StartSignal::new();
        let started = tokio::time::Instant::now();

        assert!(!signal.wait(Duration::from_millis(2500)).await);
        assert_eq!(started.elapsed(), Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_wakes_on_set() {
        let signal = StartSignal::new();
        let setter = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            setter.set();
        });

        let started = tokio::time::Instant::now();
        assert!(signal.wait(Duration::from_millis(2500)).await);
        assert_eq!(started.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_immediately_when_already_set() {
        let signal = StartSignal::new();
        signal.set();
        let started = tokio::time::Instant::now();

        assert!(signal.wait(Duration::from_secs(10)).await);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(signal.is_set());
    }

    #[test]
    fn test_late_start_promotes_awaiting_start() {
        let shared = SharedState::new();
        shared.set(ConnectionState::AwaitingStart);

        shared.mark_started();
        assert_eq!(shared.get(), ConnectionState::Started);
        assert!(shared.outcome().started);
    }

    #[test]
    fn test_start_does_not_revive_disabled() {
        let shared = SharedState::new();
        shared.set(ConnectionState::Disabled);

        shared.mark_started();
        assert_eq!(shared.get(), ConnectionState::Disabled);
        assert!(shared.start_signal().is_set());
    }

    #[test]
    fn test_transition_requires_expected_state() {
        let shared = SharedState::new();
        assert!(!shared.transition(ConnectionState::Connecting, ConnectionState::AwaitingStart));
        assert_eq!(shared.get(), ConnectionState::Unconfigured);
        assert!(shared.transition(ConnectionState::Unconfigured, ConnectionState::Connecting));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::AwaitingStart.to_string(), "awaiting-start");
        assert_eq!(ConnectionState::Disabled.to_string(), "disabled");
    }
}
