//! The per-request context handed to middleware and handlers.
//!
//! A [`Context`] bundles everything one request needs:
//!
//! - the [`Request`] (with path parameters already extracted),
//! - the instrumented response sink,
//! - a forked [`Container`] for dependency resolution,
//! - a fresh [`CorrelationId`], sent back on every response,
//! - a typed artifact store for passing data from middleware to handlers.
//!
//! The assertion helpers (`assert_*`, [`from_json`](Context::from_json),
//! [`resolve`](Context::resolve)) answer the request themselves when they
//! fail, with the matching problem response, and report the failure to the
//! caller. The caller's only job is to stop:
//!
//! ```rust
//! use keel::{Context, InvalidField, Validate};
//! use http::StatusCode;
//!
//! #[derive(serde::Deserialize, serde::Serialize)]
//! struct NewWidget { name: String }
//!
//! impl Validate for NewWidget {
//!     fn validate(&self) -> Result<(), InvalidField> { Ok(()) }
//! }
//!
//! fn create_widget(ctx: &mut Context) {
//!     let Some(widget) = ctx.from_json::<NewWidget>() else { return };
//!     ctx.respond_with_json(StatusCode::CREATED, &widget);
//! }
//! ```
//!
//! A context belongs to exactly one request and is never shared between
//! threads.

use std::fmt;
use std::sync::Arc;

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{Extensions, HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::Config;
use crate::container::Container;
use crate::correlation::{CORRELATION_ID, CorrelationId};
use crate::problem::Problem;
use crate::request::Request;
use crate::response::{BufferedResponse, MeasuredResponse};
use crate::validate::Validate;

const APPLICATION_JSON: &str = "application/json";

pub struct Context {
    request: Request,
    response: MeasuredResponse<BufferedResponse>,
    container: Container,
    config: Arc<Config>,
    correlation_id: CorrelationId,
    artifacts: Extensions,
}

impl Context {
    /// Creates the context for `request`, forking `container` so scoped
    /// services are private to this request.
    pub fn new(request: Request, container: &Container, config: Arc<Config>) -> Self {
        Self {
            request,
            response: MeasuredResponse::new(BufferedResponse::new()),
            container: container.fork(),
            config,
            correlation_id: CorrelationId::generate(),
            artifacts: Extensions::new(),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn request(&self) -> &Request { &self.request }
    pub fn correlation_id(&self) -> &CorrelationId { &self.correlation_id }
    pub fn container(&self) -> &Container { &self.container }
    pub fn config(&self) -> &Config { &self.config }

    /// The response sink: status, bytes written and elapsed time so far.
    pub fn response(&self) -> &MeasuredResponse<BufferedResponse> { &self.response }

    /// Response headers. Set these before responding.
    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        self.response.headers_mut()
    }

    /// Request header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// A path parameter extracted by the router, or `""` if absent.
    pub fn path_param(&self, name: &str) -> &str {
        self.request.param(name).unwrap_or_default()
    }

    /// A query-string parameter, or `""` if absent.
    pub fn query_param(&self, name: &str) -> String {
        self.request.query(name).unwrap_or_default()
    }

    // ── Artifacts ─────────────────────────────────────────────────────────────

    /// Stores a value for later steps of this request, keyed by its type.
    ///
    /// Wrap plain values in a newtype so unrelated middleware cannot collide.
    pub fn insert_artifact<T: Clone + Send + Sync + 'static>(&mut self, value: T) {
        self.artifacts.insert(value);
    }

    /// Reads a value stored by an earlier step of this request.
    pub fn artifact<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.artifacts.get::<T>()
    }

    // ── Dependencies ──────────────────────────────────────────────────────────

    /// Resolves `T` from this request's container.
    ///
    /// On failure the request has already been answered with a 500 problem
    /// and `None` is returned; the caller should return.
    pub fn resolve<T>(&mut self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.container.resolve::<T>() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(correlation_id = %self.correlation_id, "dependency resolution failed: {err}");
                self.internal_server_error(&err);
                None
            }
        }
    }

    // ── Assertions ────────────────────────────────────────────────────────────

    /// Checks the request's `Content-Type` against `allowed`, ignoring case
    /// and surrounding whitespace. Answers 415 on mismatch.
    pub fn assert_content_type(&mut self, allowed: &[&str]) -> bool {
        let provided = self.request.header(CONTENT_TYPE.as_str()).unwrap_or_default();
        let trimmed = provided.trim();

        if allowed.iter().any(|a| a.eq_ignore_ascii_case(trimmed)) {
            return true;
        }

        let problem = Problem::unsupported_media_type(&self.config, provided, allowed);
        self.respond_with_problem(&problem);
        false
    }

    /// Checks that the declared `Content-Length` is in `(0, max]`.
    ///
    /// An over-limit length answers 413. A missing or non-positive length
    /// answers 411, whatever `max` is.
    pub fn assert_content_length(&mut self, max: i64) -> bool {
        let length = self.request.content_length();

        if length > max {
            let problem = Problem::request_entity_too_large(&self.config, length, max);
            self.respond_with_problem(&problem);
            return false;
        }

        if length <= 0 {
            let problem = Problem::length_required(&self.config);
            self.respond_with_problem(&problem);
            return false;
        }

        true
    }

    /// Checks the request method against `allowed`, ignoring case. Answers
    /// 405 on mismatch.
    pub fn assert_method(&mut self, allowed: &[&str]) -> bool {
        let used = self.request.method().as_str();

        if allowed.iter().any(|a| a.eq_ignore_ascii_case(used)) {
            return true;
        }

        let problem = Problem::method_not_allowed(&self.config, used, allowed);
        self.respond_with_problem(&problem);
        false
    }

    /// Decodes the JSON body into `T` and validates it.
    ///
    /// In order: content type must be `application/json` (415), length must be
    /// within [`Config::json_body_limit`] (413/411), the body must decode
    /// (400), and [`Validate::validate`] must pass (422). Any failure has
    /// already been answered when `None` comes back.
    pub fn from_json<T: DeserializeOwned + Validate>(&mut self) -> Option<T> {
        if !self.assert_content_type(&[APPLICATION_JSON]) {
            return None;
        }

        if !self.assert_content_length(self.config.json_body_limit) {
            return None;
        }

        let model: T = match serde_json::from_slice(self.request.body()) {
            Ok(model) => model,
            Err(err) => {
                debug!(correlation_id = %self.correlation_id, "request body rejected: {err}");
                let problem = Problem::deserialization(&self.config, &err);
                self.respond_with_problem(&problem);
                return None;
            }
        };

        if let Err(invalid) = model.validate() {
            let problem = Problem::unprocessable_entity(&self.config, &invalid.field, &invalid.message);
            self.respond_with_problem(&problem);
            return None;
        }

        Some(model)
    }

    // ── Responding ────────────────────────────────────────────────────────────

    /// Sets the `Correlation-ID` header and commits `status`.
    ///
    /// Every other responding method ends here, so every response carries the
    /// correlation id.
    pub fn respond(&mut self, status: StatusCode) {
        let id = self.correlation_id.header_value();
        self.response.set_header(CORRELATION_ID, id);
        self.response.write_header(status);
    }

    /// Serializes `model` and sends it with `status`.
    ///
    /// If `model` fails to serialize, the status becomes 500 and the body a
    /// problem describing the failure, so a broken model never produces a
    /// mismatched status and body.
    pub fn respond_with_json<T: Serialize + ?Sized>(&mut self, status: StatusCode, model: &T) {
        let (status, body) = match serde_json::to_vec(model) {
            Ok(body) => (status, body),
            Err(err) => {
                warn!(correlation_id = %self.correlation_id, "response serialization failed: {err}");
                let problem = Problem::serialization_failure(&self.config, &err);
                (StatusCode::INTERNAL_SERVER_ERROR, encode(&problem))
            }
        };

        self.send(status, body);
    }

    /// Sends `problem` with the status of its category.
    pub fn respond_with_problem(&mut self, problem: &Problem) {
        self.send(problem.status(), encode(problem));
    }

    /// Answers 404 for a missing `subject` of `subject_type`, e.g.
    /// `ctx.not_found("User", "1234")`.
    pub fn not_found(&mut self, subject_type: &str, subject: &str) {
        let problem = Problem::not_found(&self.config, subject_type, subject);
        self.respond_with_problem(&problem);
    }

    /// Answers 500. `err` is only shown to the client when debugging is on.
    pub fn internal_server_error(&mut self, err: &dyn fmt::Display) {
        let problem = Problem::internal_server_error(&self.config, err);
        self.respond_with_problem(&problem);
    }

    fn send(&mut self, status: StatusCode, body: Vec<u8>) {
        if self.response.has_written_headers() {
            warn!(
                correlation_id = %self.correlation_id,
                sent = self.response.status().as_u16(),
                discarded = status.as_u16(),
                "response already sent, discarding a second one"
            );
            return;
        }

        let headers = self.response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

        self.respond(status);

        if let Err(err) = self.response.write(&body) {
            warn!(correlation_id = %self.correlation_id, "response body write failed: {err}");
        }
    }

    pub(crate) fn into_response(self) -> BufferedResponse {
        self.response.into_inner()
    }
}

/// A problem holds only strings and JSON values, so encoding cannot fail.
fn encode(problem: &Problem) -> Vec<u8> {
    serde_json::to_vec(problem).unwrap_or_default()
}
