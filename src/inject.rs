use std::any::Any;
use std::collections::hash_map::{Entry, HashMap};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::resolve::downcast;
use crate::*;

/// Name-keyed dependency injection container.
///
/// Registrations are resolved lazily and memoized: the first successful [Container::get]
/// fixes the instance of a name for the life of the container.
/// Cloning a container yields another handle on the same registry.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    label: Option<String>,
    trace_resolution: bool,
    registry: Mutex<Registry>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::build(None, false)
    }

    pub(crate) fn for_module(name: &str, trace_resolution: bool) -> Self {
        Self::build(Some(name.to_string()), trace_resolution)
    }

    fn build(label: Option<String>, trace_resolution: bool) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                label,
                trace_resolution,
                registry: Mutex::default(),
            }),
        }
    }

    /// Name of the owning module, if any
    pub fn name(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// Register a provider, replacing any previous registration of the same name
    pub fn register(&self, name: &str, provider: impl Into<Provider>) -> &Self {
        let name = name.trim();
        let replaced = self
            .inner
            .registry
            .lock()
            .insert(name, Binding::Provided(Arc::new(Registration::new(provider.into()))));
        if replaced {
            debug!(container = ?self.name(), name, "replaced registration");
        }
        self
    }

    /// Register a plain value
    pub fn register_value<T: Any + Send + Sync>(&self, name: &str, value: T) -> &Self {
        self.register(name, Provider::value(value))
    }

    /// Bulk registration, each entry starting with an empty instance cache
    pub fn register_all<I, S>(&self, entries: I) -> &Self
    where
        I: IntoIterator<Item = (S, Provider)>,
        S: AsRef<str>,
    {
        for (name, provider) in entries {
            self.register(name.as_ref(), provider);
        }
        self
    }

    /// Register a name resolving to this container itself
    pub(crate) fn register_context(&self, name: &str) {
        self.inner.registry.lock().insert(name, Binding::Context);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.registry.lock().0.contains_key(name.trim())
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.registry.lock().0.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a dependency, instantiating it on first use
    pub fn get(&self, name: &str) -> Result<Instance, WiringError> {
        self.request().get(name)
    }

    /// Resolve a dependency and downcast it to the expected type
    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, WiringError> {
        downcast(self.get(name)?, name.trim())
    }

    /// Retrieve the registered provider without instantiating it
    pub fn get_raw(&self, name: &str) -> Result<Provider, WiringError> {
        match self.inner.registry.lock().lookup(name.trim())? {
            Binding::Provided(reg) => Ok(reg.provider.clone()),
            Binding::Context => Ok(Provider::Value(instance(self.clone()))),
        }
    }

    /// Call a function after injecting all its dependencies
    pub fn call(&self, method: &Injectable) -> Result<Option<Instance>, WiringError> {
        self.call_on(method, &[], &mut ())
    }

    /// Call a function with a prefix of explicit arguments, injecting the remaining ones
    pub fn call_with(&self, method: &Injectable, args: &[Instance]) -> Result<Option<Instance>, WiringError> {
        self.call_on(method, args, &mut ())
    }

    /// Call a function on a receiver
    pub fn call_on<R>(
        &self,
        method: &Injectable<R>,
        args: &[Instance],
        receiver: &mut R,
    ) -> Result<Option<Instance>, WiringError> {
        self.request().call(method, args, receiver)
    }

    /// Build a new instance, bypassing the registry cache
    pub fn instantiate(&self, ctor: &Constructor, args: &[Instance]) -> Result<Instance, WiringError> {
        self.request().instantiate(ctor, args)
    }

    /// Build a new instance from a registered constructor, bypassing the registry cache
    pub fn instantiate_named(&self, name: &str, args: &[Instance]) -> Result<Instance, WiringError> {
        let name = name.trim();
        match self.get_raw(name)? {
            Provider::Factory(ctor) => self.instantiate(&ctor, args),
            Provider::Value(_) => Err(WiringError::NotConstructible(name.to_string())),
        }
    }

    /// Copy the registrations of another container which are not defined here yet.
    ///
    /// Copied registrations start with an empty instance cache.
    pub(crate) fn merge(&self, source: &Container, reserved: &[String]) -> usize {
        let incoming = source.inner.registry.lock().clone();
        self.inner.registry.lock().merge(&incoming, reserved)
    }

    /// Check if two handles share the same registry
    pub fn ptr_eq(a: &Container, b: &Container) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    fn request(&self) -> Request {
        Request::new(self.clone())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name())
            .field("registry", &self.names())
            .finish()
    }
}

struct Registration {
    provider: Provider,
    instance: OnceCell<Instance>,
    /// Thread currently running the factory, if any
    building: Mutex<Option<ThreadId>>,
}

impl Registration {
    fn new(provider: Provider) -> Self {
        Self {
            provider,
            instance: OnceCell::new(),
            building: Mutex::new(None),
        }
    }

    /// Mark the factory as running on this thread.
    ///
    /// Returns `None` when this thread is already running it, which means the factory asked for
    /// its own name through a new request.
    fn enter(&self) -> Option<Building<'_>> {
        let me = thread::current().id();
        let mut owner = self.building.lock();
        match *owner {
            Some(id) if id == me => None,
            Some(_) => Some(Building { reg: self, owned: false }),
            None => {
                *owner = Some(me);
                Some(Building { reg: self, owned: true })
            }
        }
    }

    /// Same provider, nothing resolved yet
    fn fresh(&self) -> Self {
        Self::new(self.provider.clone())
    }
}

/// Clears the running marker of a registration when dropped
struct Building<'a> {
    reg: &'a Registration,
    owned: bool,
}

impl Drop for Building<'_> {
    fn drop(&mut self) {
        if self.owned {
            *self.reg.building.lock() = None;
        }
    }
}

#[derive(Clone)]
enum Binding {
    Provided(Arc<Registration>),
    Context,
}

#[derive(Default, Clone)]
struct Registry(HashMap<String, Binding>);

impl Registry {
    fn insert(&mut self, name: &str, binding: Binding) -> bool {
        self.0.insert(name.to_string(), binding).is_some()
    }

    fn lookup(&self, name: &str) -> Result<Binding, WiringError> {
        self.0
            .get(name)
            .cloned()
            .ok_or_else(|| WiringError::UnknownDependency(name.to_string()))
    }

    fn merge(&mut self, source: &Registry, reserved: &[String]) -> usize {
        let mut copied = 0;
        for (name, slot) in &source.0 {
            if reserved.iter().any(|r| r == name) {
                continue;
            }
            let Binding::Provided(reg) = slot else {
                continue;
            };
            if let Entry::Vacant(v) = self.0.entry(name.clone()) {
                v.insert(Binding::Provided(Arc::new(reg.fresh())));
                copied += 1;
            }
        }
        copied
    }
}

#[derive(Debug)]
enum Visit {
    Instantiating,
    Resolved(Instance),
}

/// Resolution scope of a single top-level call, used to detect cycles
struct Request {
    container: Container,
    visited: HashMap<String, Visit>,
    trail: Vec<String>,
}

impl Request {
    fn new(container: Container) -> Self {
        Self {
            container,
            visited: HashMap::new(),
            trail: Vec::new(),
        }
    }

    fn get(&mut self, name: &str) -> Result<Instance, WiringError> {
        let name = name.trim();
        match self.visited.get(name) {
            Some(Visit::Resolved(value)) => return Ok(value.clone()),
            Some(Visit::Instantiating) => {
                self.trail.push(name.to_string());
                return Err(WiringError::CircularDependency(self.trail.join(" -> ")));
            }
            None => (),
        }

        if self.container.inner.trace_resolution {
            trace!(container = ?self.container.name(), name, depth = self.trail.len(), "resolving");
        }
        self.trail.push(name.to_string());
        self.visited.insert(name.to_string(), Visit::Instantiating);
        let value = self.resolve(name)?;
        self.trail.pop();
        self.visited.insert(name.to_string(), Visit::Resolved(value.clone()));
        Ok(value)
    }

    fn resolve(&mut self, name: &str) -> Result<Instance, WiringError> {
        // The registry lock is released before any user code runs
        let slot = self.container.inner.registry.lock().lookup(name)?;
        let reg = match slot {
            Binding::Context => return Ok(instance(self.container.clone())),
            Binding::Provided(reg) => reg,
        };
        if let Some(value) = reg.instance.get() {
            return Ok(value.clone());
        }
        let value = match &reg.provider {
            Provider::Value(value) => value.clone(),
            Provider::Factory(ctor) => {
                let Some(_building) = reg.enter() else {
                    let chain = format!("{} -> {}", self.trail.join(" -> "), name);
                    return Err(WiringError::CircularDependency(chain));
                };
                self.instantiate(ctor, &[])?
            }
        };
        Ok(reg.instance.get_or_init(|| value).clone())
    }

    fn instantiate(&mut self, ctor: &Constructor, args: &[Instance]) -> Result<Instance, WiringError> {
        let mut slot = ctor.allocate();
        let produced = self.call(ctor.init(), args, &mut slot)?;
        Ok(produced.unwrap_or_else(|| Arc::from(slot)))
    }

    fn call<R>(
        &mut self,
        method: &Injectable<R>,
        args: &[Instance],
        receiver: &mut R,
    ) -> Result<Option<Instance>, WiringError> {
        let names = method.parameter_names();
        let mut values = args.to_vec();
        for name in names.iter().skip(values.len()) {
            let value = self.get(name)?;
            values.push(value);
        }
        let args = Args::new(names.to_vec(), values, self.container.clone());
        method.invoke(receiver, &args)
    }
}
