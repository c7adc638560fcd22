//! Declared endpoints.

use std::fmt;
use std::sync::Arc;

use http::Method;

use crate::context::Context;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::Middleware;

/// One endpoint: a method, a path pattern, a middleware chain and a handler.
///
/// Path parameters use `{name}` syntax and a trailing `{*name}` catches the
/// rest of the path. Several routes may share a path as long as their
/// methods differ.
///
/// ```rust
/// use keel::{Context, Route};
///
/// fn get_item(ctx: &mut Context) {
///     let id = ctx.path_param("id").to_owned();
///     ctx.not_found("Item", &id);
/// }
///
/// let route = Route::get("/items/{id}", get_item);
/// assert_eq!(route.path(), "/items/{id}");
/// ```
#[derive(Clone)]
pub struct Route {
    method: Method,
    path: String,
    middleware: Vec<Arc<dyn Middleware>>,
    handler: BoxedHandler,
}

impl Route {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        handler: impl Fn(&mut Context) + Send + Sync + 'static,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            middleware: Vec::new(),
            handler: handler.into_boxed_handler(),
        }
    }

    pub fn get(path: impl Into<String>, handler: impl Fn(&mut Context) + Send + Sync + 'static) -> Self {
        Self::new(Method::GET, path, handler)
    }

    pub fn post(path: impl Into<String>, handler: impl Fn(&mut Context) + Send + Sync + 'static) -> Self {
        Self::new(Method::POST, path, handler)
    }

    pub fn put(path: impl Into<String>, handler: impl Fn(&mut Context) + Send + Sync + 'static) -> Self {
        Self::new(Method::PUT, path, handler)
    }

    pub fn patch(path: impl Into<String>, handler: impl Fn(&mut Context) + Send + Sync + 'static) -> Self {
        Self::new(Method::PATCH, path, handler)
    }

    pub fn delete(path: impl Into<String>, handler: impl Fn(&mut Context) + Send + Sync + 'static) -> Self {
        Self::new(Method::DELETE, path, handler)
    }

    /// Appends a middleware step. Steps run in the order they are added.
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already-shared middleware step.
    pub fn with_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn middleware(&self) -> &[Arc<dyn Middleware>] { &self.middleware }

    pub(crate) fn handler(&self) -> &BoxedHandler { &self.handler }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}
