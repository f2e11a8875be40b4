//! Error types for neutral component synchronization

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::rpc::RpcError;

/// Main error type for transport and connection operations
#[derive(Error, Debug)]
pub enum RtiError {
    /// Port configuration could not be used
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// General I/O error (bind, connect, read, write)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing failed (oversized frame or I/O below the codec)
    #[error("Frame error: {0}")]
    Frame(#[from] tokio_util::codec::LinesCodecError),

    /// Error during JSON serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The remote side answered with a JSON-RPC error object
    #[error("Remote error: {0}")]
    Remote(#[from] RpcError),

    /// The remote side answered with something that is not a valid response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The peer closed the stream before answering
    #[error("Connection closed before a response arrived")]
    ConnectionClosed,

    /// An operation did not finish within its bound
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being waited for ("connect", "response")
        operation: &'static str,
        /// The bound that was exceeded
        after: Duration,
    },

    /// No scheduler handle is present
    #[error("Not connected to a scheduler")]
    NotConnected,
}

/// Result type alias using RtiError
pub type RtiResult<T> = Result<T, RtiError>;

/// Per-name failure kinds reported by the component registry.
///
/// None of these abort a batch: the failing name is skipped and the
/// remaining names are still processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    /// No factory is registered under this name
    #[error("No factory registered for neutral component: {name}")]
    ResolutionFailed {
        /// The requested component name
        name: String,
    },

    /// The factory ran but did not produce a component
    #[error("Unable to construct neutral component {name}: {reason}")]
    ConstructionFailed {
        /// The requested component name
        name: String,
        /// Factory error or panic message
        reason: String,
    },

    /// The name is not part of the currently loaded set
    #[error("Unable to find neutral component: {name}")]
    UnknownComponent {
        /// The requested component name
        name: String,
    },

    /// The component's `execute()` returned an error or panicked
    #[error("Unable to execute neutral component {name}: {reason}")]
    ExecutionFailed {
        /// The component name
        name: String,
        /// Execution error or panic message
        reason: String,
    },
}

impl ComponentError {
    /// Name of the component this failure is about
    pub fn name(&self) -> &str {
        match self {
            ComponentError::ResolutionFailed { name }
            | ComponentError::ConstructionFailed { name, .. }
            | ComponentError::UnknownComponent { name }
            | ComponentError::ExecutionFailed { name, .. } => name,
        }
    }
}
