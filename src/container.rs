//! Typed dependency container.
//!
//! Services are registered once at startup against a type (often a
//! `dyn Trait`) and resolved per request through
//! [`Context::resolve`](crate::Context::resolve). The dispatcher
//! [`fork`](Container::fork)s the root container for every request:
//!
//! | Lifetime | Built | Shared by |
//! |---|---|---|
//! | [`Lifetime::Singleton`] | once, on first resolve | every fork |
//! | [`Lifetime::Scoped`] | once per fork | one request |
//! | [`Lifetime::Transient`] | on every resolve | nobody |
//!
//! ```rust
//! use std::sync::Arc;
//! use keel::{Container, Lifetime};
//!
//! trait Greeter: Send + Sync { fn greet(&self) -> String; }
//! struct English;
//! impl Greeter for English { fn greet(&self) -> String { "hello".into() } }
//!
//! let mut container = Container::new();
//! container.register::<dyn Greeter>(Lifetime::Singleton, |_| Ok(Arc::new(English)));
//!
//! let greeter = container.fork().resolve::<dyn Greeter>().unwrap();
//! assert_eq!(greeter.greet(), "hello");
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// How long a resolved instance lives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lifetime {
    Singleton,
    Scoped,
    Transient,
}

/// Why a type could not be resolved.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("the type `{0}` does not have a resolver in this container")]
    Unregistered(&'static str),

    #[error("failed to construct `{type_name}`: {message}")]
    Construction { type_name: &'static str, message: String },
}

impl ResolveError {
    /// Convenience for factories that fail.
    pub fn construction<T: ?Sized>(message: impl Into<String>) -> Self {
        Self::Construction { type_name: type_name::<T>(), message: message.into() }
    }
}

/// Cached instances hold an `Arc<T>` behind `dyn Any`, so unsized `T` works.
type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Container) -> Result<Instance, ResolveError> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    lifetime: Lifetime,
    factory: Factory,
}

type Cache = Mutex<HashMap<TypeId, Instance>>;

/// A typed service container with singleton, scoped and transient lifetimes.
#[derive(Clone, Default)]
pub struct Container {
    registrations: Arc<HashMap<TypeId, Registration>>,
    singletons: Arc<Cache>,
    scoped: Arc<Cache>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `T`, replacing any earlier registration.
    ///
    /// Register everything before the first [`fork`](Self::fork); forks
    /// taken earlier keep the registrations they were created with.
    pub fn register<T>(
        &mut self,
        lifetime: Lifetime,
        factory: impl Fn(&Container) -> Result<Arc<T>, ResolveError> + Send + Sync + 'static,
    ) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |c: &Container| factory(c).map(|v| Arc::new(v) as Instance));
        Arc::make_mut(&mut self.registrations)
            .insert(TypeId::of::<T>(), Registration { lifetime, factory });
        self
    }

    /// Registers an already-built singleton.
    pub fn register_instance<T>(&mut self, value: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register::<T>(Lifetime::Singleton, move |_| Ok(Arc::clone(&value)))
    }

    /// A child container for one request: registrations and singletons are
    /// shared, scoped instances start empty.
    pub fn fork(&self) -> Self {
        Self {
            registrations: Arc::clone(&self.registrations),
            singletons: Arc::clone(&self.singletons),
            scoped: Arc::default(),
        }
    }

    pub fn resolve<T>(&self) -> Result<Arc<T>, ResolveError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = TypeId::of::<T>();
        let registration = self
            .registrations
            .get(&key)
            .ok_or(ResolveError::Unregistered(type_name::<T>()))?;

        let instance = match registration.lifetime {
            Lifetime::Transient => (registration.factory)(self)?,
            Lifetime::Singleton => cached(&self.singletons, key, || (registration.factory)(self))?,
            Lifetime::Scoped => cached(&self.scoped, key, || (registration.factory)(self))?,
        };

        instance
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or(ResolveError::Unregistered(type_name::<T>()))
    }
}

/// Looks `key` up in `cache`, building it with `build` on a miss.
///
/// The lock is not held while building, so factories may resolve their own
/// dependencies. If two threads race, the first insert wins.
fn cached(
    cache: &Cache,
    key: TypeId,
    build: impl FnOnce() -> Result<Instance, ResolveError>,
) -> Result<Instance, ResolveError> {
    if let Some(hit) = lock(cache).get(&key) {
        return Ok(Arc::clone(hit));
    }

    let built = build()?;
    Ok(Arc::clone(lock(cache).entry(key).or_insert(built)))
}

fn lock(cache: &Cache) -> std::sync::MutexGuard<'_, HashMap<TypeId, Instance>> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}
