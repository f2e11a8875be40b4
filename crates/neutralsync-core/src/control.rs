//! Executor side of the test-control contract

use std::sync::Arc;

use tracing::{debug, info};

use crate::handshake::SharedState;
use crate::registry::ComponentRegistry;
use crate::remote::TestControl;

/// Applies the scheduler's `rti.*` commands to a session
#[derive(Debug)]
pub struct ExecutorControl {
    registry: Arc<ComponentRegistry>,
    shared: SharedState,
}

impl ExecutorControl {
    pub(crate) fn new(registry: Arc<ComponentRegistry>, shared: SharedState) -> Self {
        Self { registry, shared }
    }
}

impl TestControl for ExecutorControl {
    fn start(&self) {
        debug!("start received");
        self.shared.mark_started();
    }

    fn load_neutral_components(&self, names: &[String]) {
        let report = self.registry.load(names);
        info!(
            loaded = report.loaded.len(),
            failed = report.failures.len(),
            "loadNeutralComponents handled"
        );
    }

    fn execute_neutral_components(&self, names: &[String]) {
        let report = self.registry.execute(names);
        debug!(
            executed = report.executed.len(),
            failed = report.failures.len(),
            "executeNeutralComponents handled"
        );
    }
}
