//! # neutralsync-core
//!
//! Synchronization between a UI test executor and an external scheduler.
//!
//! The executor runs inside the application under test. Before each UI action
//! it tells the scheduler which neutral background components (timers,
//! animations, pollers) are active, and waits for the scheduler to
//! acknowledge. The scheduler in turn loads, executes and starts things on
//! the executor through a small control service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────── executor process ───────────────────────────┐
//! │                                                                        │
//! │  test body ──► SyncSession::handshake ──► ConnectionManager            │
//! │      │                                     ├── SchedulerClient ────────┼──► scheduler.ready
//! │      │                                     └── control server task ◄───┼─── rti.start
//! │      │                                            │                    │    rti.loadNeutralComponents
//! │      │                                            ▼                    │    rti.executeNeutralComponents
//! │      │                                     ExecutorControl             │
//! │      │                                            │                    │
//! │      │                                            ▼                    │
//! │      └──► InjectionNotifier ──reads──► ComponentRegistry               │
//! │                 │                                                      │
//! │                 └──────────────────────────────────────────────────────┼──► scheduler.atInjectionSite
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Degraded mode
//!
//! Synchronization is best effort. Missing ports, an unreachable scheduler
//! or a missing `start()` never fail the test run: the session ends up
//! [`ConnectionState::Disabled`] (or returns with `started == false`) and
//! every later notification is a no-op.
//!
//! ```ignore
//! let mut catalog = ComponentCatalog::new();
//! catalog.register_default::<CursorBlink>();
//!
//! let session = SyncSession::new(catalog, SessionOptions::default());
//! let outcome = session.handshake(&EnvConfig::new()).await;
//!
//! session.notify("click #submit").await;
//! ```

pub mod component;
pub mod config;
pub mod connection;
pub mod control;
pub mod error;
pub mod handshake;
pub mod logging;
pub mod notifier;
pub mod registry;
pub mod remote;
pub mod rpc;
pub mod session;

pub use component::{ComponentCatalog, ComponentFactory, NeutralComponent};
pub use config::{ConfigError, ConfigProvider, EnvConfig, PropertiesConfig, SessionOptions, SyncPorts};
pub use connection::{Connect, ConnectionManager};
pub use control::ExecutorControl;
pub use error::{ComponentError, RtiError, RtiResult};
pub use handshake::{ConnectionState, HandshakeOutcome, StartSignal};
pub use notifier::{InjectionNotifier, NotifyOutcome};
pub use registry::{ComponentRegistry, ComponentSet, ExecuteReport, LoadReport};
pub use remote::{
    SchedulerClient, SchedulerEndpoint, SchedulerService, TestControl, TestControlClient,
    TestControlEndpoint,
};
pub use session::SyncSession;
