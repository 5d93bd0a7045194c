use std::any::Any;
use std::sync::Arc;

use crate::{Instance, WiringError};

/// Wrap a value into a shared [Instance]
pub fn instance<T: Any + Send + Sync>(value: T) -> Instance {
    Arc::new(value)
}

/// Conversion of the value returned by an injected function.
///
/// Returning nothing (`()` or `None`) lets a constructor keep its allocated value.
pub trait Produce {
    fn produce(self) -> Result<Option<Instance>, WiringError>;
}

impl Produce for () {
    fn produce(self) -> Result<Option<Instance>, WiringError> {
        Ok(None)
    }
}

impl Produce for Instance {
    fn produce(self) -> Result<Option<Instance>, WiringError> {
        Ok(Some(self))
    }
}

impl Produce for Option<Instance> {
    fn produce(self) -> Result<Option<Instance>, WiringError> {
        Ok(self)
    }
}

impl<T: Produce> Produce for Result<T, WiringError> {
    fn produce(self) -> Result<Option<Instance>, WiringError> {
        self?.produce()
    }
}

/// Build an [Injectable](crate::Injectable) from a closure-like declaration.
///
/// The dependency names are the parameter identifiers, each parameter is downcast
/// to an ```Arc``` of the declared type. A trailing ```; name``` binds the container
/// performing the call. The body may use ```?``` on [WiringError] results and must
/// evaluate to a [Produce] type.
///
/// ```
/// # use modwire::*;
/// let container = Container::new();
/// container.register_value("base", 40u32);
///
/// let add: Injectable = inject!(|base: u32; ctx| {
///     assert!(ctx.contains("base"));
///     instance(*base + 2)
/// });
/// let sum = container.call(&add)?.expect("a value");
/// assert_eq!(sum.downcast_ref::<u32>(), Some(&42));
/// # Ok::<(), WiringError>(())
/// ```
#[macro_export]
macro_rules! inject {
    (|| $body:expr) => {
        $crate::Injectable::new(
            ::std::iter::empty::<&str>(),
            move |_, _: &$crate::Args| $crate::Produce::produce($body),
        )
    };
    (|; $ctx:ident| $body:expr) => {
        $crate::Injectable::new(
            ::std::iter::empty::<&str>(),
            move |_, args: &$crate::Args| {
                let $ctx: &$crate::Container = args.container();
                $crate::Produce::produce($body)
            },
        )
    };
    (|$($name:ident : $ty:ty),+ ; $ctx:ident| $body:expr) => {
        $crate::Injectable::new(
            [$(stringify!($name)),+],
            move |_, args: &$crate::Args| {
                $( let $name: ::std::sync::Arc<$ty> = args.get(stringify!($name))?; )+
                let $ctx: &$crate::Container = args.container();
                $crate::Produce::produce($body)
            },
        )
    };
    (|$($name:ident : $ty:ty),+ $(,)?| $body:expr) => {
        $crate::Injectable::new(
            [$(stringify!($name)),+],
            move |_, args: &$crate::Args| {
                $( let $name: ::std::sync::Arc<$ty> = args.get(stringify!($name))?; )+
                $crate::Produce::produce($body)
            },
        )
    };
}
