//! Providers, injectable units and the errors raised while wiring them.
//!
//! A container stores one [Provider] per name. The provider is either a ready-made value or a
//! [Constructor] building the value on first use.
//!
//! * An [Injectable] is a function together with the ordered list of dependency names it expects.
//!   The names are resolved by the container and handed to the function as [Args].
//! * A [Constructor] splits instantiation in two phases: allocating an empty value, then running
//!   an [Injectable] with that value as its receiver. The injectable may also return a different
//!   value, which then replaces the allocated one.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::helpers::Produce;
use crate::inject::Container;

/// Shared, type-erased value stored in a container
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Owned value allocated by a [Constructor] before its initializer runs
pub type Slot = Box<dyn Any + Send + Sync>;

type Body<R> = dyn Fn(&mut R, &Args) -> Result<Option<Instance>, WiringError> + Send + Sync;

/// Errors triggered during the wiring process
#[derive(Error, Debug)]
pub enum WiringError {
    #[error("Unknown dependency: {0}")]
    UnknownDependency(String),
    #[error("Circular reference: {0}")]
    CircularDependency(String),
    #[error("Cannot find module: {0}")]
    MissingOrInvalidModuleUse(String),
    #[error("The construct creating '{0}' did not return anything")]
    ConstructReturnedNothing(String),
    #[error("Unknown construct: {0}")]
    UnknownConstruct(String),
    #[error("Module '{0}' is not an app")]
    NotAnApp(String),
    #[error("'{0}' is registered as a value and cannot be instantiated")]
    NotConstructible(String),
    #[error("Type mismatch for '{name}': expected {expected}")]
    TypeMismatch { name: String, expected: &'static str },
    #[error("Missing argument: {0}")]
    MissingArgument(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A function with an explicit, ordered list of dependency names.
///
/// The receiver type `R` is the value the function is applied to: `()` for plain calls,
/// the allocated [Slot] for constructors and the [Module](crate::Module) for module callbacks.
pub struct Injectable<R = ()> {
    deps: Vec<String>,
    body: Arc<Body<R>>,
}

impl<R: 'static> Injectable<R> {
    /// Create an injectable unit from its dependency names and its body.
    ///
    /// Names are trimmed. A manifest made of a single blank name declares no dependency.
    pub fn new<I, S, F, O>(deps: I, body: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&mut R, &Args) -> O + Send + Sync + 'static,
        O: Produce + 'static,
    {
        let mut deps: Vec<String> = deps
            .into_iter()
            .map(|name| name.as_ref().trim().to_string())
            .collect();
        if deps.len() == 1 && deps[0].is_empty() {
            deps.clear();
        }
        Self {
            deps,
            body: Arc::new(move |receiver: &mut R, args: &Args| body(receiver, args).produce()),
        }
    }
}

impl<R> Injectable<R> {
    /// The dependency names, in parameter order
    pub fn parameter_names(&self) -> &[String] {
        &self.deps
    }

    pub(crate) fn invoke(&self, receiver: &mut R, args: &Args) -> Result<Option<Instance>, WiringError> {
        (self.body)(receiver, args)
    }
}

impl<R> Clone for Injectable<R> {
    fn clone(&self) -> Self {
        Self {
            deps: self.deps.clone(),
            body: self.body.clone(),
        }
    }
}

impl<R> fmt::Debug for Injectable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injectable").field("deps", &self.deps).finish()
    }
}

/// Resolved arguments of an injected call.
///
/// Values follow the parameter order: positional arguments first, injected dependencies after.
/// The container performing the call is always available as the trailing argument.
pub struct Args {
    names: Vec<String>,
    values: Vec<Instance>,
    container: Container,
}

impl Args {
    pub(crate) fn new(names: Vec<String>, values: Vec<Instance>, container: Container) -> Self {
        Self {
            names,
            values,
            container,
        }
    }

    /// Number of arguments, not counting the trailing container
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The container which resolved this call
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Raw argument at the given position
    pub fn instance(&self, index: usize) -> Result<&Instance, WiringError> {
        self.values
            .get(index)
            .ok_or_else(|| WiringError::MissingArgument(format!("#{}", index)))
    }

    /// Typed argument at the given position
    pub fn at<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, WiringError> {
        let label = self
            .names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("#{}", index));
        downcast(self.instance(index)?.clone(), &label)
    }

    /// Typed argument bound to the given dependency name
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, WiringError> {
        let index = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| WiringError::MissingArgument(name.to_string()))?;
        self.at(index)
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("names", &self.names)
            .field("len", &self.values.len())
            .finish()
    }
}

pub(crate) fn downcast<T: Any + Send + Sync>(value: Instance, name: &str) -> Result<Arc<T>, WiringError> {
    value.downcast::<T>().map_err(|_| WiringError::TypeMismatch {
        name: name.to_string(),
        expected: type_name::<T>(),
    })
}

/// Two-phase factory: allocate an empty value, then initialize it with injected dependencies.
#[derive(Clone)]
pub struct Constructor {
    allocate: Arc<dyn Fn() -> Slot + Send + Sync>,
    init: Injectable<Slot>,
}

impl Constructor {
    /// Constructor allocating a unit value, for initializers which return the instance themselves
    pub fn new(init: Injectable<Slot>) -> Self {
        Self {
            allocate: Arc::new(|| -> Slot { Box::new(()) }),
            init,
        }
    }

    /// Constructor allocating its value with `allocate` before running `init` on it
    pub fn with_prototype<T, A>(allocate: A, init: Injectable<Slot>) -> Self
    where
        T: Any + Send + Sync,
        A: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            allocate: Arc::new(move || -> Slot { Box::new(allocate()) }),
            init,
        }
    }

    /// Constructor producing a unit value and requiring nothing
    pub fn empty() -> Self {
        Self::new(Injectable::new(Vec::<String>::new(), |_, _| ()))
    }

    pub fn parameter_names(&self) -> &[String] {
        self.init.parameter_names()
    }

    pub(crate) fn allocate(&self) -> Slot {
        (self.allocate)()
    }

    pub(crate) fn init(&self) -> &Injectable<Slot> {
        &self.init
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Constructor").field(&self.init.deps).finish()
    }
}

/// Registered content for a name
#[derive(Clone)]
pub enum Provider {
    /// Returned as-is
    Value(Instance),
    /// Instantiated once, on first resolution
    Factory(Constructor),
}

impl Provider {
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Provider::Value(Arc::new(value))
    }

    pub fn is_factory(&self) -> bool {
        matches!(self, Provider::Factory(_))
    }
}

impl From<Constructor> for Provider {
    fn from(ctor: Constructor) -> Self {
        Provider::Factory(ctor)
    }
}

impl From<Instance> for Provider {
    fn from(value: Instance) -> Self {
        Provider::Value(value)
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Value(_) => f.write_str("Value(..)"),
            Provider::Factory(ctor) => ctor.fmt(f),
        }
    }
}
