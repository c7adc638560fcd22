//! The compiled request handler.
//!
//! Every request, matched or not, goes through the same adapter:
//!
//! 1. Look the path up in the route table; extract path parameters.
//! 2. Create the [`Context`] (instrumented sink, forked container,
//!    correlation id).
//! 3. Run the path's table (method check, middleware, handler) or, for an
//!    unknown path, answer 404, all inside a panic boundary.
//! 4. A panic becomes a 500 problem if nothing has been sent yet. Once the
//!    status line is out, a late panic can only be logged.
//! 5. Emit one access-log line, whatever happened.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use matchit::Router as MatchitRouter;
use tracing::{error, info};

use crate::builder::PathTable;
use crate::config::Config;
use crate::container::Container;
use crate::context::Context;
use crate::format::{friendly_duration, friendly_size};
use crate::problem::Problem;
use crate::request::Request;
use crate::response::BufferedResponse;

// ── AccessLog ─────────────────────────────────────────────────────────────────

/// Receives one formatted line per completed request:
///
/// ```text
/// • 404 0s 160.00 B /hello
/// ```
///
/// Status code, duration, response body size and request path. Closures
/// `Fn(&str)` implement this trait.
pub trait AccessLog: Send + Sync {
    fn log(&self, line: &str);
}

impl<F> AccessLog for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, line: &str) {
        self(line)
    }
}

/// The default access log: an `info` event with target `keel::access`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAccessLog;

impl AccessLog for TracingAccessLog {
    fn log(&self, line: &str) {
        info!(target: "keel::access", "{}", line.trim_end());
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// The immutable, shareable entry point produced by
/// [`DispatchBuilder::build`](crate::DispatchBuilder::build).
///
/// Cloning is one atomic increment; every clone serves from the same table.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    router: MatchitRouter<PathTable>,
    container: Container,
    config: Arc<Config>,
    access_log: Arc<dyn AccessLog>,
}

impl Dispatcher {
    pub(crate) fn new(
        router: MatchitRouter<PathTable>,
        container: Container,
        config: Arc<Config>,
        access_log: Arc<dyn AccessLog>,
    ) -> Self {
        Self { inner: Arc::new(Inner { router, container, config, access_log }) }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Handles one request to completion. Never panics on behalf of a
    /// handler; the result is always a complete response.
    pub fn handle(&self, mut request: Request) -> BufferedResponse {
        let inner = &*self.inner;
        let path = request.path().to_owned();

        let table = match inner.router.at(&path) {
            Ok(matched) => {
                request.params = matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                Some(matched.value)
            }
            Err(_) => None,
        };

        let mut ctx = Context::new(request, &inner.container, Arc::clone(&inner.config));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match table {
            Some(table) => table.call(&mut ctx),
            None => ctx.not_found("path", &path),
        }));

        if let Err(payload) = outcome {
            recover(&mut ctx, &path, payload);
        }

        self.finish(ctx, &path)
    }

    /// [`handle`](Self::handle) for a hyper-shaped request and response.
    pub fn handle_http(&self, request: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        self.handle(request.into()).into_http()
    }

    /// Answers 413 without routing, for a body the transport refused to
    /// buffer. `length` is the declared length, or a lower bound when the
    /// body was sent without one.
    pub(crate) fn reject_too_large(
        &self,
        request: http::Request<Bytes>,
        length: i64,
        max: i64,
    ) -> http::Response<Full<Bytes>> {
        let inner = &*self.inner;
        let request: Request = request.into();
        let path = request.path().to_owned();

        let mut ctx = Context::new(request, &inner.container, Arc::clone(&inner.config));
        let problem = Problem::request_entity_too_large(&inner.config, length, max);
        ctx.respond_with_problem(&problem);

        self.finish(ctx, &path).into_http()
    }

    /// Emits the access-log line and releases the buffered response.
    fn finish(&self, ctx: Context, path: &str) -> BufferedResponse {
        let sink = ctx.response();
        self.inner.access_log.log(&format!(
            "• {} {} {} {}\n",
            sink.status().as_u16(),
            friendly_duration(sink.duration()),
            friendly_size(sink.volume()),
            path,
        ));

        ctx.into_response()
    }
}

/// Turns a caught panic into a 500, unless the response is already on its way.
fn recover(ctx: &mut Context, path: &str, payload: Box<dyn Any + Send>) {
    let message = panic_message(payload.as_ref());

    if ctx.response().has_written_headers() {
        error!(
            correlation_id = %ctx.correlation_id(),
            path,
            status = ctx.response().status().as_u16(),
            "handler panicked after responding: {message}"
        );
        return;
    }

    error!(correlation_id = %ctx.correlation_id(), path, "handler panicked: {message}");
    ctx.internal_server_error(&message);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked with a non-string payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_of(f: impl FnOnce() + panic::UnwindSafe) -> Box<dyn Any + Send> {
        panic::catch_unwind(f).unwrap_err()
    }

    #[test]
    fn panic_messages_are_extracted() {
        let payload = payload_of(|| panic!("static text"));
        assert_eq!(panic_message(payload.as_ref()), "static text");

        let payload = payload_of(|| panic!("formatted {}", 42));
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");

        let payload = payload_of(|| panic::panic_any(7_u8));
        assert_eq!(panic_message(payload.as_ref()), "handler panicked with a non-string payload");
    }
}
