//! # keel
//!
//! A small HTTP request-handling framework for JSON services.
//!
//! ## What you get
//!
//! - Radix-tree routing with `{param}` segments via [`matchit`]
//! - A per-request [`Context`] with path/query access, typed artifacts,
//!   a scoped dependency [`Container`] and a correlation id
//! - Content-type, content-length and method guards that answer with
//!   `application/json` [`Problem`] documents
//! - JSON decoding with post-decode [`Validate`] checks
//! - Per-route [`Middleware`] chains that can short-circuit
//! - A panic boundary and one access-log line per request
//! - A hyper [`Server`] with graceful shutdown on SIGTERM / Ctrl-C
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use keel::{Config, Container, Context, DispatchBuilder, Route, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), keel::Error> {
//!     let dispatcher = DispatchBuilder::new(Container::new(), Config::from_env()?)
//!         .route(Route::get("/users/{id}", get_user))
//!         .build()?;
//!
//!     Server::bind(([0, 0, 0, 0], 3000)).serve(dispatcher).await
//! }
//!
//! fn get_user(ctx: &mut Context) {
//!     let id = ctx.path_param("id").to_owned();
//!     ctx.respond_with_json(StatusCode::OK, &serde_json::json!({ "id": id }));
//! }
//! ```

mod builder;
mod config;
mod container;
mod context;
mod correlation;
mod dispatcher;
mod error;
mod format;
mod handler;
mod middleware;
mod request;
mod response;
mod route;
mod server;
mod validate;

pub mod problem;

pub use builder::DispatchBuilder;
pub use config::{Config, DEFAULT_JSON_BODY_LIMIT};
pub use container::{Container, Lifetime, ResolveError};
pub use context::Context;
pub use correlation::{CORRELATION_ID, CorrelationId};
pub use dispatcher::{AccessLog, Dispatcher, TracingAccessLog};
pub use error::Error;
pub use format::{friendly_duration, friendly_size};
pub use handler::Handler;
pub use middleware::Middleware;
pub use problem::Problem;
pub use request::Request;
pub use response::{BufferedResponse, MeasuredResponse, ResponseWriter};
pub use route::Route;
pub use server::Server;
pub use validate::{InvalidField, Validate};
