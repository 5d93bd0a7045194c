//! Name-keyed dependency injection container with composable modules and app bootstrap.
//!
//! # Simple use case
//!
//! ```
//! # use std::sync::Arc;
//! # use modwire::*;
//! struct Greeter {
//!     greeting: Arc<String>,
//! }
//!
//! # fn main() -> Result<(), WiringError> {
//! let modules = Registrar::new();
//!
//! // A library module providing a value
//! let lang = modules.module("lang");
//! lang.register_value("greeting", String::from("Hello"));
//!
//! // An app using it, with a service built on first use
//! let app = modules.app("hello");
//! app.uses(["lang"]);
//! app.service("greeter", Constructor::new(inject!(|greeting: String| {
//!     instance(Greeter { greeting })
//! })))?;
//! app.on_start(inject!(|greeter: Greeter| println!("{} world", greeter.greeting)))?;
//!
//! app.start()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! A [Container] maps names to [Provider]s. A provider is either a value, returned as-is,
//! or a [Constructor] instantiated on first use and cached for the life of the container.
//!
//! * Injectable functions ([Injectable]) carry the ordered names of their dependencies.
//!   Each call resolves those names within a single request, which fails with
//!   [WiringError::CircularDependency] if a name is requested again while it is being built.
//!   The container performing the call is always passed as trailing argument.
//! * The [inject!] macro derives the dependency names from the parameter names of a closure.
//!
//! Composition happens at the module level.
//!
//! * A [Module] wraps a container. ```uses``` declares dependencies on other modules and copies
//!   their constructs and registrations when they already exist.
//! * A [Construct] is a named template turning a constructor into a registration.
//!   Every module provides the ```service``` construct, which registers the constructor itself.
//! * An app is a module which can be started. Starting walks the transitive ```uses``` graph,
//!   merges every registry into the app container, runs the ```config``` callbacks in dependency
//!   order and finally the app ```start``` callbacks.
//! * A [Registrar] owns the modules of an application and the [Globals] they share.

mod config;
mod helpers;
mod inject;
mod module;
mod registrar;
mod resolve;

pub use config::RegistrarConfig;
pub use helpers::{instance, Produce};
pub use inject::Container;
pub use module::{Construct, Module, Shape, CONTEXT, GLOBALS, SERVICE};
pub use registrar::{Globals, Registrar};
pub use resolve::{Args, Constructor, Injectable, Instance, Provider, Slot, WiringError};
