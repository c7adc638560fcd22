//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! A route table holds handlers of *different* closure types side by side.
//! Rust collections can only hold one concrete type, so each handler is
//! hidden behind a trait object (`dyn ErasedHandler`) and stored uniformly.
//!
//! ```text
//! fn get_item(ctx: &mut Context) { … }         ← user writes this
//!        ↓ Route::get("/items/{id}", get_item)
//! get_item.into_boxed_handler()                 ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(get_item))                 ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(&mut ctx)  at request time       ← one vtable dispatch
//! ```
//!
//! Handlers are synchronous. The server runs each request on tokio's blocking
//! pool, so a handler may block on I/O without stalling the reactor.

use std::sync::Arc;

use crate::context::Context;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: &mut Context);
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any function or
/// closure with the signature:
///
/// ```text
/// fn name(ctx: &mut Context)
/// ```
///
/// The handler answers through the context (`ctx.respond_with_json(..)`,
/// `ctx.not_found(..)`); it has no return value. The trait is sealed.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F> private::Sealed for F where F: Fn(&mut Context) + Send + Sync + 'static {}

impl<F> Handler for F
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype wrapper that holds a concrete handler `F` and implements
/// [`ErasedHandler`], bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F> ErasedHandler for FnHandler<F>
where
    F: Fn(&mut Context) + Send + Sync,
{
    fn call(&self, ctx: &mut Context) {
        (self.0)(ctx)
    }
}
