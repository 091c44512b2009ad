use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

pub type InstanceObject = Arc<dyn Any + Send + Sync>;

/// Named live objects (browser drivers, documents, windows) shared by the
/// commands of a run. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct InstanceRegistry {
    entries: Arc<RwLock<HashMap<String, InstanceObject>>>,
}

static GLOBAL_INSTANCES: OnceLock<InstanceRegistry> = OnceLock::new();

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry visible to every new run.
    pub fn global() -> &'static InstanceRegistry {
        GLOBAL_INSTANCES.get_or_init(InstanceRegistry::new)
    }

    /// Fresh per-run registry seeded with the current global entries.
    pub fn for_new_run() -> Self {
        let registry = Self::new();
        registry.merge_from(Self::global());
        registry
    }

    pub fn merge_from(&self, other: &InstanceRegistry) {
        if Arc::ptr_eq(&self.entries, &other.entries) {
            return;
        }
        let source = other.entries.read();
        let mut target = self.entries.write();
        for (name, object) in source.iter() {
            target
                .entry(name.clone())
                .or_insert_with(|| Arc::clone(object));
        }
    }

    pub fn insert(&self, name: impl Into<String>, object: InstanceObject) -> Option<InstanceObject> {
        self.entries.write().insert(name.into(), object)
    }

    /// Registers in this run and in the global registry.
    pub fn publish(&self, name: impl Into<String>, object: InstanceObject) {
        let name = name.into();
        Self::global().insert(name.clone(), Arc::clone(&object));
        self.insert(name, object);
    }

    pub fn get(&self, name: &str) -> Option<InstanceObject> {
        self.entries.read().get(name).cloned()
    }

    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name)?.downcast::<T>().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<InstanceObject> {
        self.entries.write().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.entries.read().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("names", &self.names())
            .finish()
    }
}
