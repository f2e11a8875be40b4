//! Component registry: the set of neutral components the scheduler controls
//!
//! The registry starts out unloaded. Every `load` builds a complete new set
//! off to the side and then publishes it with a single pointer swap, so a
//! concurrent reader sees either the previous set or the new one in full.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ComponentRegistry                                           │
//! │  ├── catalog: ComponentCatalog   (name → factory)            │
//! │  └── current: RwLock<Option<Arc<ComponentSet>>>             │
//! │        None          → never loaded                          │
//! │        Some(empty)   → loaded with no usable components      │
//! │        Some(set)     → most recently completed load          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::component::{ComponentCatalog, NeutralComponent};
use crate::error::ComponentError;

/// One loaded component together with the name it was requested under
#[derive(Clone)]
struct Entry {
    name: String,
    component: Arc<dyn NeutralComponent>,
}

/// An immutable, fully constructed set of neutral components.
///
/// Names are unique; iteration follows the order of the load request.
#[derive(Clone, Default)]
pub struct ComponentSet {
    entries: Vec<Entry>,
}

impl ComponentSet {
    fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Look up a component by the name it was loaded under
    pub fn get(&self, name: &str) -> Option<Arc<dyn NeutralComponent>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.component.clone())
    }

    /// Names in iteration order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Components whose `can_execute()` is currently true, with their names
    fn active(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.component.can_execute())
    }

    /// Number of components in the set
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of a `load` batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Names that made it into the new set, in order
    pub loaded: Vec<String>,
    /// Names that were skipped and why
    pub failures: Vec<ComponentError>,
    /// Names requested more than once; only the first occurrence is kept
    pub duplicates: Vec<String>,
}

/// Outcome of an `execute` batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteReport {
    /// Names whose `execute()` completed successfully, in order
    pub executed: Vec<String>,
    /// Names that were not found or failed while executing
    pub failures: Vec<ComponentError>,
}

/// Owner of the current set of neutral components.
pub struct ComponentRegistry {
    catalog: ComponentCatalog,
    current: RwLock<Option<Arc<ComponentSet>>>,
}

impl ComponentRegistry {
    /// Create an unloaded registry resolving names through `catalog`
    pub fn new(catalog: ComponentCatalog) -> Self {
        Self {
            catalog,
            current: RwLock::new(None),
        }
    }

    /// The registration table used by `load`
    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }

    /// Whether any `load` has completed yet
    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// The current set, or `None` if the registry was never loaded.
    ///
    /// The returned snapshot is unaffected by later loads.
    pub fn snapshot(&self) -> Option<Arc<ComponentSet>> {
        self.current.read().clone()
    }

    /// Replace the current set with freshly constructed components.
    ///
    /// Each name is resolved through the catalog and constructed. A name that
    /// cannot be resolved or constructed is logged and skipped; the rest of
    /// the batch still loads. The new set is published atomically once the
    /// whole batch has been processed.
    pub fn load(&self, names: &[String]) -> LoadReport {
        info!(count = names.len(), "Loading neutral components");

        let mut set = ComponentSet::default();
        let mut report = LoadReport::default();

        for name in names {
            if set.contains(name) {
                warn!(component = %name, "Neutral component requested twice, keeping the first");
                report.duplicates.push(name.clone());
                continue;
            }

            match self.construct(name) {
                Ok(component) => {
                    debug!(component = %name, kind = component.name(), "Loaded neutral component");
                    set.entries.push(Entry {
                        name: name.clone(),
                        component,
                    });
                    report.loaded.push(name.clone());
                }
                Err(e) => {
                    error!(component = %name, error = %e, "Unable to load neutral component");
                    report.failures.push(e);
                }
            }
        }

        *self.current.write() = Some(Arc::new(set));
        report
    }

    fn construct(&self, name: &str) -> Result<Arc<dyn NeutralComponent>, ComponentError> {
        let factory = self
            .catalog
            .resolve(name)
            .ok_or_else(|| ComponentError::ResolutionFailed {
                name: name.to_string(),
            })?;

        match panic::catch_unwind(AssertUnwindSafe(|| factory())) {
            Ok(Ok(component)) => Ok(component),
            Ok(Err(e)) => Err(ComponentError::ConstructionFailed {
                name: name.to_string(),
                reason: format!("{:#}", e),
            }),
            Err(payload) => Err(ComponentError::ConstructionFailed {
                name: name.to_string(),
                reason: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Look up a component in the current set
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn NeutralComponent>> {
        self.snapshot().and_then(|set| set.get(name))
    }

    /// Components whose `can_execute()` is true right now, in set order.
    ///
    /// Returns `None` if the registry was never loaded, which is distinct
    /// from `Some(vec![])` for a loaded set with nothing active.
    pub fn get_active(&self) -> Option<Vec<Arc<dyn NeutralComponent>>> {
        self.snapshot()
            .map(|set| set.active().map(|e| e.component.clone()).collect())
    }

    /// Names of the components `get_active` would return
    pub fn active_names(&self) -> Option<Vec<String>> {
        self.snapshot()
            .map(|set| set.active().map(|e| e.name.clone()).collect())
    }

    /// Run `execute()` on each named component in order.
    ///
    /// Unknown names and failing components are logged and reported; the
    /// remaining names still run. Panics inside a component are trapped.
    pub fn execute(&self, names: &[String]) -> ExecuteReport {
        let set = self.snapshot();
        let mut report = ExecuteReport::default();

        for name in names {
            let Some(component) = set.as_ref().and_then(|s| s.get(name)) else {
                let e = ComponentError::UnknownComponent { name: name.clone() };
                error!(component = %name, "{}", e);
                report.failures.push(e);
                continue;
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| component.execute()));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{:#}", e)),
                Err(payload) => Some(panic_message(payload.as_ref())),
            };

            match failure {
                None => {
                    debug!(component = %name, kind = component.name(), "Executed neutral component");
                    report.executed.push(name.clone());
                }
                Some(reason) => {
                    let e = ComponentError::ExecutionFailed {
                        name: name.clone(),
                        reason,
                    };
                    error!(component = %name, error = %e, "Neutral component failed");
                    report.failures.push(e);
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("catalog", &self.catalog)
            .field("loaded", &self.snapshot().map(|s| s.names()))
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
