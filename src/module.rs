//! Modules compose a container with dependency edges (```uses```), construct templates,
//! configuration callbacks and, for apps, start callbacks.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::registrar::{self, Shared};
use crate::*;

/// Name resolving to the app container itself
pub const CONTEXT: &str = "context";

/// Name of the object shared by all modules of a registrar
pub const GLOBALS: &str = "globals";

/// Name of the construct registered on every module
pub const SERVICE: &str = "service";

/// Turn a constructor into the provider registered by a construct
#[derive(Clone)]
pub struct Shape(Arc<dyn Fn(Constructor, &str) -> Option<Provider> + Send + Sync>);

impl Shape {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Constructor, &str) -> Option<Provider> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Register the constructor unchanged
    pub fn identity() -> Self {
        Self::new(|ctor, _| Some(Provider::Factory(ctor)))
    }

    fn apply(&self, ctor: Constructor, name: &str) -> Option<Provider> {
        (self.0)(ctor, name)
    }
}

/// Named factory template.
///
/// The creator is injected through the module container, with the module as receiver,
/// and must return a [Shape].
#[derive(Clone, Debug)]
pub struct Construct {
    creator: Injectable<Module>,
}

impl Construct {
    pub fn new(creator: Injectable<Module>) -> Self {
        Self { creator }
    }

    /// Construct whose creator returns `shape` and requires nothing
    pub fn returning(shape: Shape) -> Self {
        Self::new(Injectable::new(Vec::<String>::new(), move |_, _| {
            instance(shape.clone())
        }))
    }

    /// The identity construct, available on every module as ```service```
    pub fn service() -> Self {
        Self::returning(Shape::identity())
    }
}

/// Named unit of registrations, shared by handle
#[derive(Clone)]
pub struct Module {
    inner: Arc<ModuleInner>,
}

struct ModuleInner {
    name: String,
    is_app: bool,
    container: Container,
    reserved: Vec<String>,
    registrar: Weak<Shared>,
    state: Mutex<ModuleState>,
}

#[derive(Default)]
struct ModuleState {
    constructs: HashMap<String, Construct>,
    uses: Vec<String>,
    config: Vec<Injectable<Module>>,
    start: Vec<Injectable<Module>>,
    started: bool,
    bootstrapping: bool,
}

impl Module {
    pub(crate) fn create(name: &str, is_app: bool, shared: &Arc<Shared>) -> Self {
        let config = shared.config();
        let container = Container::for_module(name, config.trace_resolution);
        if is_app {
            container.register_context(CONTEXT);
        }
        container.register(GLOBALS, Provider::Value(shared.globals_instance()));

        let module = Self {
            inner: Arc::new(ModuleInner {
                name: name.to_string(),
                is_app,
                container,
                reserved: config.reserved_names.clone(),
                registrar: Arc::downgrade(shared),
                state: Mutex::default(),
            }),
        };
        module.construct(SERVICE, Construct::service());
        debug!(module = name, is_app, "created module");
        module
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_app(&self) -> bool {
        self.inner.is_app
    }

    pub fn is_started(&self) -> bool {
        self.inner.state.lock().started
    }

    pub fn container(&self) -> &Container {
        &self.inner.container
    }

    /// Names passed to [Module::uses], in call order
    pub fn dependencies(&self) -> Vec<String> {
        self.inner.state.lock().uses.clone()
    }

    /// Names of the constructs available on this module, sorted
    pub fn constructs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.state.lock().constructs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn register(&self, name: &str, provider: impl Into<Provider>) -> &Self {
        self.inner.container.register(name, provider);
        self
    }

    pub fn register_value<T: Any + Send + Sync>(&self, name: &str, value: T) -> &Self {
        self.inner.container.register_value(name, value);
        self
    }

    pub fn register_all<I, S>(&self, entries: I) -> &Self
    where
        I: IntoIterator<Item = (S, Provider)>,
        S: AsRef<str>,
    {
        self.inner.container.register_all(entries);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.container.contains(name)
    }

    pub fn get(&self, name: &str) -> Result<Instance, WiringError> {
        self.inner.container.get(name)
    }

    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, WiringError> {
        self.inner.container.get_as(name)
    }

    /// Declare module dependencies.
    ///
    /// Modules which already exist hand over their constructs and registrations right away.
    /// Undefined modules and apps are only checked when an app starts.
    pub fn uses<I, S>(&self, names: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            self.inner.state.lock().uses.push(name.to_string());

            let Some(used) = self.lookup(name) else {
                debug!(module = self.name(), uses = name, "deferred use of undefined module");
                continue;
            };
            if used.is_app() {
                continue;
            }

            let inherited = used.inner.state.lock().constructs.clone();
            {
                let mut state = self.inner.state.lock();
                for (construct, template) in inherited {
                    state.constructs.entry(construct).or_insert(template);
                }
            }
            let copied = self.inner.container.merge(&used.inner.container, &self.inner.reserved);
            debug!(module = self.name(), uses = name, copied, "merged module");
        }
        self
    }

    /// Add a construct, replacing any construct of the same name
    pub fn construct(&self, name: &str, construct: Construct) -> &Self {
        self.inner.state.lock().constructs.insert(name.to_string(), construct);
        self
    }

    /// Apply a construct to a constructor and register the result under `name`
    pub fn build(&self, construct: &str, name: &str, ctor: Constructor) -> Result<Provider, WiringError> {
        let template = self
            .inner
            .state
            .lock()
            .constructs
            .get(construct)
            .cloned()
            .ok_or_else(|| WiringError::UnknownConstruct(construct.to_string()))?;

        let mut receiver = self.clone();
        let shape = self
            .inner
            .container
            .call_on(&template.creator, &[], &mut receiver)?
            .ok_or_else(|| WiringError::ConstructReturnedNothing(name.to_string()))?
            .downcast::<Shape>()
            .map_err(|_| WiringError::TypeMismatch {
                name: construct.to_string(),
                expected: type_name::<Shape>(),
            })?;
        let provider = shape
            .apply(ctor, name)
            .ok_or_else(|| WiringError::ConstructReturnedNothing(name.to_string()))?;

        debug!(module = self.name(), construct, name, "built construct");
        self.inner.container.register(name, provider.clone());
        Ok(provider)
    }

    /// Apply a construct without a dedicated constructor
    pub fn build_empty(&self, construct: &str, name: &str) -> Result<Provider, WiringError> {
        self.build(construct, name, Constructor::empty())
    }

    /// Register a constructor through the ```service``` construct
    pub fn service(&self, name: &str, ctor: Constructor) -> Result<Provider, WiringError> {
        self.build(SERVICE, name, ctor)
    }

    /// Queue a callback to run when the app using this module starts
    pub fn config(&self, callback: Injectable<Module>) -> &Self {
        self.inner.state.lock().config.push(callback);
        self
    }

    /// Queue a callback to run after all configuration callbacks
    pub fn on_start(&self, callback: Injectable<Module>) -> Result<&Self, WiringError> {
        self.ensure_app()?;
        self.inner.state.lock().start.push(callback);
        Ok(self)
    }

    /// Bootstrap the app: merge all used registries, then run config and start callbacks.
    ///
    /// Only the first successful call has an effect. A call made while the app is bootstrapping
    /// returns immediately. When a callback fails the app stays unstarted and `start` may be
    /// called again.
    pub fn start(&self) -> Result<&Self, WiringError> {
        self.ensure_app()?;
        if self.begin_bootstrap() {
            let result = registrar::bootstrap(self);
            self.finish_bootstrap(result.is_ok());
            result?;
        }
        Ok(self)
    }

    /// Run an injectable through the app container, with the app as receiver
    pub fn call(&self, method: &Injectable<Module>) -> Result<Option<Instance>, WiringError> {
        self.ensure_app()?;
        let mut receiver = self.clone();
        self.inner.container.call_on(method, &[], &mut receiver)
    }

    pub fn ptr_eq(a: &Module, b: &Module) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Module> {
        self.inner.registrar.upgrade().and_then(|shared| shared.get(name))
    }

    pub(crate) fn reserved(&self) -> &[String] {
        &self.inner.reserved
    }

    fn begin_bootstrap(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.started || state.bootstrapping {
            return false;
        }
        state.bootstrapping = true;
        true
    }

    fn finish_bootstrap(&self, started: bool) {
        let mut state = self.inner.state.lock();
        state.bootstrapping = false;
        state.started = started;
    }

    pub(crate) fn config_callbacks(&self) -> Vec<Injectable<Module>> {
        self.inner.state.lock().config.clone()
    }

    pub(crate) fn start_callbacks(&self) -> Vec<Injectable<Module>> {
        self.inner.state.lock().start.clone()
    }

    fn ensure_app(&self) -> Result<(), WiringError> {
        if self.inner.is_app {
            Ok(())
        } else {
            Err(WiringError::NotAnApp(self.inner.name.clone()))
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.inner.name)
            .field("is_app", &self.inner.is_app)
            .field("uses", &self.dependencies())
            .finish()
    }
}
