//! Collects routes at startup and compiles them into a [`Dispatcher`].
//!
//! Registration is single-threaded setup work. [`DispatchBuilder::build`]
//! consumes the builder, so nothing can be registered once requests are being
//! served; the compiled table is immutable and shared by every request.
//!
//! ```rust
//! use keel::{Config, Container, Context, DispatchBuilder, Route};
//!
//! fn hello(ctx: &mut Context) {
//!     ctx.respond_with_json(http::StatusCode::OK, &"hello");
//! }
//!
//! let dispatcher = DispatchBuilder::new(Container::new(), Config::default())
//!     .route(Route::get("/hello", hello))
//!     .build()
//!     .unwrap();
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::config::Config;
use crate::container::Container;
use crate::context::Context;
use crate::dispatcher::{AccessLog, Dispatcher, TracingAccessLog};
use crate::error::Error;
use crate::middleware::run_chain;
use crate::route::Route;

pub struct DispatchBuilder {
    container: Container,
    config: Arc<Config>,
    access_log: Arc<dyn AccessLog>,
    routes_by_path: BTreeMap<String, Vec<Route>>,
}

impl DispatchBuilder {
    pub fn new(container: Container, config: Config) -> Self {
        Self {
            container,
            config: Arc::new(config),
            access_log: Arc::new(TracingAccessLog),
            routes_by_path: BTreeMap::new(),
        }
    }

    /// Replaces the default `tracing` access log.
    pub fn access_log(mut self, log: impl AccessLog + 'static) -> Self {
        self.access_log = Arc::new(log);
        self
    }

    /// Registers a route. Returns `self` for chaining.
    ///
    /// The path is trimmed and backslashes become forward slashes. Routes
    /// sharing a path are told apart by method.
    pub fn route(mut self, route: Route) -> Self {
        let path = normalize_path(route.path());
        self.routes_by_path.entry(path).or_default().push(route);
        self
    }

    /// Compiles the registered routes into a [`Dispatcher`].
    ///
    /// Fails if a path is empty, if the router rejects a pattern (bad syntax
    /// or a conflict with another pattern), or if one path registers the same
    /// method twice.
    pub fn build(self) -> Result<Dispatcher, Error> {
        let mut router = MatchitRouter::new();

        for (path, routes) in self.routes_by_path {
            let table = PathTable::compile(&path, routes)?;
            router
                .insert(path.clone(), table)
                .map_err(|source| Error::InvalidRoute { path, source })?;
        }

        Ok(Dispatcher::new(router, self.container, self.config, self.access_log))
    }
}

fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim().to_owned()
}

// ── PathTable ─────────────────────────────────────────────────────────────────

/// Every route registered for one path, keyed by method.
pub(crate) struct PathTable {
    routes: Vec<Route>,
}

impl PathTable {
    fn compile(path: &str, routes: Vec<Route>) -> Result<Self, Error> {
        if path.is_empty() {
            return Err(Error::EmptyPath);
        }

        for (i, route) in routes.iter().enumerate() {
            let method = route.method().as_str();
            let repeated = routes[..i]
                .iter()
                .any(|earlier| earlier.method().as_str().eq_ignore_ascii_case(method));
            if repeated {
                return Err(Error::DuplicateRoute {
                    method: route.method().clone(),
                    path: path.to_owned(),
                });
            }
        }

        Ok(Self { routes })
    }

    /// Method check, then the matching route's middleware, then its handler.
    pub(crate) fn call(&self, ctx: &mut Context) {
        let allowed: Vec<&str> = self.routes.iter().map(|r| r.method().as_str()).collect();
        if !ctx.assert_method(&allowed) {
            return;
        }

        let used = ctx.request().method().as_str();
        let Some(route) = self
            .routes
            .iter()
            .find(|r| r.method().as_str().eq_ignore_ascii_case(used))
        else {
            return;
        };

        if run_chain(route.middleware(), ctx).is_break() {
            return;
        }

        route.handler().call(ctx);
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;

    fn noop(_: &mut Context) {}

    #[test]
    fn normalizes_separators_and_whitespace() {
        assert_eq!(normalize_path("  \\items\\{id} "), "/items/{id}");
        assert_eq!(normalize_path("/plain"), "/plain");
    }

    #[test]
    fn rejects_a_repeated_method_on_one_path() {
        let err = DispatchBuilder::new(Container::new(), Config::default())
            .route(Route::get("/items", noop))
            .route(Route::new(Method::from_bytes(b"get").unwrap(), " /items", noop))
            .build()
            .err()
            .unwrap();

        assert!(matches!(err, Error::DuplicateRoute { ref path, .. } if path == "/items"));
    }

    #[test]
    fn rejects_conflicting_patterns() {
        let err = DispatchBuilder::new(Container::new(), Config::default())
            .route(Route::get("/items/{id}", noop))
            .route(Route::put("/items/{name}", noop))
            .build()
            .err()
            .unwrap();

        assert!(matches!(err, Error::InvalidRoute { .. }));
    }

    #[test]
    fn rejects_empty_paths() {
        let err = DispatchBuilder::new(Container::new(), Config::default())
            .route(Route::get("   ", noop))
            .build()
            .err()
            .unwrap();

        assert!(matches!(err, Error::EmptyPath));
    }

    #[test]
    fn shares_a_path_between_methods() {
        let built = DispatchBuilder::new(Container::new(), Config::default())
            .route(Route::get("/items/{id}", noop))
            .route(Route::delete("/items/{id}", noop))
            .route(Route::post("/items", noop))
            .build();

        assert!(built.is_ok());
    }
}
