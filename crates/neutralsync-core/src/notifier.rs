//! Injection notifier: the per-action synchronization point

use std::sync::Arc;

use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::registry::ComponentRegistry;

/// What happened to one injection-site notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// No scheduler handle; nothing was sent
    Skipped,
    /// The scheduler acknowledged; `active` is what it was told
    Delivered {
        /// Active component names, `None` if the registry was never loaded
        active: Option<Vec<String>>,
    },
    /// The call failed; the failure was logged and the action may proceed
    Failed,
}

/// Reports each imminent UI action to the scheduler.
///
/// Cheap to clone; every clone observes the same session.
#[derive(Debug, Clone)]
pub struct InjectionNotifier {
    connection: Arc<ConnectionManager>,
    registry: Arc<ComponentRegistry>,
}

impl InjectionNotifier {
    pub(crate) fn new(connection: Arc<ConnectionManager>, registry: Arc<ComponentRegistry>) -> Self {
        Self {
            connection,
            registry,
        }
    }

    /// Tell the scheduler `action` is about to be delivered.
    ///
    /// Returns once the scheduler has acknowledged. Without a scheduler handle
    /// this returns [`NotifyOutcome::Skipped`] without any I/O. Failures never
    /// propagate.
    pub async fn notify(&self, action: &str) -> NotifyOutcome {
        let Some(scheduler) = self.connection.scheduler() else {
            return NotifyOutcome::Skipped;
        };

        let active = self.registry.active_names();
        debug!(action, active = ?active, "At injection site");

        match scheduler.at_injection_site(action, active.as_deref()).await {
            Ok(()) => NotifyOutcome::Delivered { active },
            Err(e) => {
                warn!(action, error = %e, "Injection site notification failed");
                NotifyOutcome::Failed
            }
        }
    }
}
