//! Middleware: ordered pre-handler steps that may short-circuit a request.
//!
//! A route's middleware runs in declaration order before its handler. Each
//! step returns [`ControlFlow::Continue`] to pass the request on, or
//! [`ControlFlow::Break`] to stop the chain. A step that breaks has already
//! answered the request (or chosen not to); neither later steps nor the
//! handler run.
//!
//! Data a step wants the handler to see goes into the context's artifact
//! store:
//!
//! ```rust
//! use std::ops::ControlFlow;
//! use keel::{Context, Middleware};
//!
//! #[derive(Clone)]
//! struct ApiKey(String);
//!
//! struct RequireApiKey;
//!
//! impl Middleware for RequireApiKey {
//!     fn handle(&self, ctx: &mut Context) -> ControlFlow<()> {
//!         match ctx.header("x-api-key").map(str::to_owned) {
//!             Some(key) => {
//!                 ctx.insert_artifact(ApiKey(key));
//!                 ControlFlow::Continue(())
//!             }
//!             None => {
//!                 ctx.respond(http::StatusCode::UNAUTHORIZED);
//!                 ControlFlow::Break(())
//!             }
//!         }
//!     }
//! }
//! ```

use std::ops::ControlFlow;

use crate::context::Context;

pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: &mut Context) -> ControlFlow<()>;
}

/// Plain functions and closures work as middleware.
impl<F> Middleware for F
where
    F: Fn(&mut Context) -> ControlFlow<()> + Send + Sync,
{
    fn handle(&self, ctx: &mut Context) -> ControlFlow<()> {
        self(ctx)
    }
}

/// Runs `chain` in order. Returns `Break` as soon as one step breaks.
pub(crate) fn run_chain(chain: &[std::sync::Arc<dyn Middleware>], ctx: &mut Context) -> ControlFlow<()> {
    for middleware in chain {
        middleware.handle(ctx)?;
    }
    ControlFlow::Continue(())
}
