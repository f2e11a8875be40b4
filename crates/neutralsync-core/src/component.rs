//! Neutral components and the registration table used to build them
//!
//! A neutral component is a background activity (timer, animation, poller)
//! that is not the subject of the UI action under test, but whose progress the
//! scheduler wants to observe or drive.
//!
//! The scheduler refers to components by name only. Each component variant is
//! registered once in a [`ComponentCatalog`] under that name together with a
//! factory; loading a batch of names resolves every name through the catalog.
//!
//! ```ignore
//! #[derive(Default)]
//! struct Clock;
//!
//! impl NeutralComponent for Clock {
//!     fn can_execute(&self) -> bool { true }
//!     fn execute(&self) -> anyhow::Result<()> { Ok(()) }
//! }
//!
//! let mut catalog = ComponentCatalog::new();
//! catalog.register_default::<Clock>();
//! catalog.register("poller", || Ok(Arc::new(Poller::connect()?)));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A background activity the scheduler can inspect and drive.
pub trait NeutralComponent: Send + Sync {
    /// Whether the component currently has work it could perform.
    fn can_execute(&self) -> bool;

    /// Perform one unit of the component's pending work.
    fn execute(&self) -> anyhow::Result<()>;

    /// Type label logged as `kind` next to the load name.
    ///
    /// The registry and the scheduler identify a component by the name it
    /// was loaded under, never by this label. Defaults to the Rust type name,
    /// which is also the name [`ComponentCatalog::register_default`]
    /// registers the type under.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Constructor for one component variant.
pub type ComponentFactory =
    Arc<dyn Fn() -> anyhow::Result<Arc<dyn NeutralComponent>> + Send + Sync>;

/// Name → factory lookup table.
#[derive(Clone, Default)]
pub struct ComponentCatalog {
    factories: HashMap<String, ComponentFactory>,
}

impl ComponentCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any earlier registration.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn NeutralComponent>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register `C::default` under the type name of `C`.
    pub fn register_default<C>(&mut self) -> &mut Self
    where
        C: NeutralComponent + Default + 'static,
    {
        self.register(std::any::type_name::<C>(), || {
            Ok(Arc::new(C::default()) as Arc<dyn NeutralComponent>)
        })
    }

    /// Look up the factory registered under `name`.
    pub fn resolve(&self, name: &str) -> Option<ComponentFactory> {
        self.factories.get(name).cloned()
    }

    /// Whether a factory is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered variants
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether the catalog has no registrations
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ComponentCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentCatalog")
            .field("names", &self.names())
            .finish()
    }
}
