//! Registry of named modules and the app bootstrap.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::resolve::downcast;
use crate::*;

/// Values shared by every module and app of a [Registrar]
#[derive(Default)]
pub struct Globals {
    values: Mutex<HashMap<String, Instance>>,
}

impl Globals {
    pub fn get(&self, name: &str) -> Option<Instance> {
        self.values.lock().get(name).cloned()
    }

    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, WiringError> {
        let value = self
            .get(name)
            .ok_or_else(|| WiringError::UnknownDependency(name.to_string()))?;
        downcast(value, name)
    }

    /// Store a value, returning the one it replaces
    pub fn set(&self, name: &str, value: Instance) -> Option<Instance> {
        self.values.lock().insert(name.to_string(), value)
    }

    pub fn remove(&self, name: &str) -> Option<Instance> {
        self.values.lock().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.lock().contains_key(name)
    }
}

impl fmt::Debug for Globals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.values.lock().keys().cloned().collect();
        keys.sort();
        f.debug_set().entries(keys).finish()
    }
}

pub(crate) struct Shared {
    modules: Mutex<HashMap<String, Module>>,
    globals: Arc<Globals>,
    config: RegistrarConfig,
}

impl Shared {
    pub(crate) fn get(&self, name: &str) -> Option<Module> {
        self.modules.lock().get(name).cloned()
    }

    pub(crate) fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    pub(crate) fn globals_instance(&self) -> Instance {
        self.globals.clone()
    }
}

/// Owner of all modules and apps of an application.
///
/// Asking twice for the same name returns the same module. A name keeps the kind
/// (module or app) it was first created with.
#[derive(Clone)]
pub struct Registrar {
    shared: Arc<Shared>,
}

impl Default for Registrar {
    fn default() -> Self {
        Self::new()
    }
}

impl Registrar {
    pub fn new() -> Self {
        Self::with_config(RegistrarConfig::default())
    }

    pub fn with_config(config: RegistrarConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                modules: Mutex::default(),
                globals: Arc::default(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &RegistrarConfig {
        &self.shared.config
    }

    /// Create or retrieve a library module
    pub fn module(&self, name: &str) -> Module {
        self.entry(name, false)
    }

    /// Create or retrieve an app
    pub fn app(&self, name: &str) -> Module {
        self.entry(name, true)
    }

    pub fn get(&self, name: &str) -> Option<Module> {
        self.shared.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shared.modules.lock().contains_key(name)
    }

    /// Names of all modules and apps, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.modules.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn globals(&self) -> Arc<Globals> {
        self.shared.globals.clone()
    }

    /// Forget all modules. Existing handles remain usable but can no longer see each other.
    pub fn clear(&self) {
        self.shared.modules.lock().clear();
        debug!("cleared module registry");
    }

    fn entry(&self, name: &str, is_app: bool) -> Module {
        let mut modules = self.shared.modules.lock();
        if let Some(module) = modules.get(name) {
            return module.clone();
        }
        let module = Module::create(name, is_app, &self.shared);
        modules.insert(name.to_string(), module.clone());
        module
    }
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<Module> = self.shared.modules.lock().values().cloned().collect();
        modules.sort_by(|a, b| a.name().cmp(b.name()));
        f.debug_list().entries(modules).finish()
    }
}

/// Run the bootstrap sequence of an app
pub(crate) fn bootstrap(app: &Module) -> Result<(), WiringError> {
    let order = walk(app)?;

    let context = app.container();
    for module in &order {
        if !Module::ptr_eq(module, app) {
            context.merge(module.container(), app.reserved());
        }
    }
    debug!(app = app.name(), modules = order.len(), "merged app registries");

    for module in &order {
        let mut receiver = module.clone();
        for callback in module.config_callbacks() {
            context.call_on(&callback, &[], &mut receiver)?;
        }
        if module.is_app() {
            for callback in module.start_callbacks() {
                context.call_on(&callback, &[], &mut receiver)?;
            }
        }
    }
    debug!(app = app.name(), "started app");
    Ok(())
}

/// Modules reachable from `root` through ```uses```, in depth-first post-order
fn walk(root: &Module) -> Result<Vec<Module>, WiringError> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(root, &mut visited, &mut order)?;
    Ok(order)
}

fn visit(module: &Module, visited: &mut HashSet<String>, order: &mut Vec<Module>) -> Result<(), WiringError> {
    for name in module.dependencies() {
        if visited.contains(&name) {
            continue;
        }
        let used = module
            .lookup(&name)
            .filter(|m| !m.is_app())
            .ok_or_else(|| WiringError::MissingOrInvalidModuleUse(name.clone()))?;
        visited.insert(name);
        visit(&used, visited, order)?;
    }
    order.push(module.clone());
    Ok(())
}
