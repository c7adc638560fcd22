//! Response writers and the instrumented sink.
//!
//! Handlers never build a response value and return it. They write through
//! the [`Context`](crate::Context), which writes through a
//! [`MeasuredResponse`], which writes through a raw [`ResponseWriter`]:
//!
//! ```text
//! ctx.respond_with_json(..)
//!        ↓
//! MeasuredResponse     ← records status, bytes and elapsed time
//!        ↓
//! BufferedResponse     ← the raw writer; becomes the hyper response
//! ```

use std::io;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::de::DeserializeOwned;

/// Durations below this are reported as zero.
const DURATION_FLOOR: Duration = Duration::from_millis(5);

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The raw writer contract: headers, then a status line, then body bytes.
pub trait ResponseWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commits the status line. Only the first call takes effect.
    fn write_header(&mut self, status: StatusCode);

    /// Appends body bytes, committing `200 OK` first if no status was sent.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

// ── BufferedResponse ─────────────────────────────────────────────────────────

/// An in-memory [`ResponseWriter`].
///
/// Behaves like a socket once the status line is out: header changes made
/// after that are dropped, and body bytes past a declared `Content-Length`
/// are refused.
///
/// The dispatcher writes every response into one of these and hands it to
/// the transport with [`into_http`](BufferedResponse::into_http). Tests read
/// it back with [`status`](BufferedResponse::status),
/// [`body`](BufferedResponse::body) and [`json`](BufferedResponse::json).
#[derive(Debug, Default)]
pub struct BufferedResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    // Handed out by `headers_mut` after the status is committed.
    detached: HeaderMap,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed status, or `200 OK` if nothing was committed.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response header lookup. Non-UTF-8 values read as `None`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// The declared `Content-Length`, if one was set before committing.
    fn declared_length(&self) -> Option<usize> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseWriter for BufferedResponse {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        if self.status.is_some() {
            self.detached.clear();
            return &mut self.detached;
        }
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.status.get_or_insert(StatusCode::OK);

        if let Some(declared) = self.declared_length() {
            if self.body.len() + buf.len() > declared {
                return Err(io::Error::other(format!(
                    "write of {} bytes exceeds the declared Content-Length of {declared}",
                    buf.len()
                )));
            }
        }

        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }
}

// ── MeasuredResponse ─────────────────────────────────────────────────────────

/// Decorates a [`ResponseWriter`], recording the status code, the number of
/// body bytes written and the time since the request started.
///
/// The status line is write-once: the first [`write_header`](Self::write_header)
/// is recorded and forwarded, later calls are ignored.
#[derive(Debug)]
pub struct MeasuredResponse<W> {
    inner: W,
    started: Instant,
    status: Option<StatusCode>,
    volume: i64,
}

impl<W: ResponseWriter> MeasuredResponse<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, started: Instant::now(), status: None, volume: 0 }
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Sets a response header, replacing any previous value.
    pub fn set_header(&mut self, name: http::header::HeaderName, value: HeaderValue) {
        self.inner.headers_mut().insert(name, value);
    }

    pub fn write_header(&mut self, status: StatusCode) {
        if self.status.is_some() {
            return;
        }

        self.status = Some(status);
        self.inner.write_header(status);
    }

    /// Writes body bytes, committing `200 OK` first if no status was sent.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }

        let n = self.inner.write(buf)?;
        self.volume += n as i64;
        Ok(n)
    }

    /// The recorded status, defaulting to `200 OK` so logs never show zero.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn has_written_headers(&self) -> bool {
        self.status.is_some()
    }

    /// Time since the sink was created, floored to zero below 5 ms.
    pub fn duration(&self) -> Duration {
        let elapsed = self.started.elapsed();
        if elapsed < DURATION_FLOOR { Duration::ZERO } else { elapsed }
    }

    /// Body bytes written so far.
    pub fn volume(&self) -> i64 {
        self.volume
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use http::header::CONTENT_TYPE;

    use super::*;

    #[test]
    fn forwards_headers_to_the_inner_writer() {
        let mut sink = MeasuredResponse::new(BufferedResponse::new());
        sink.set_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        assert_eq!(sink.get_ref().header("content-type"), Some("text/plain"));
    }

    #[test]
    fn records_volume_of_written_bytes() {
        let mut sink = MeasuredResponse::new(BufferedResponse::new());
        sink.write(b"Hello, World!").unwrap();

        assert_eq!(sink.volume(), 13);
        assert_eq!(sink.into_inner().body(), b"Hello, World!");
    }

    #[test]
    fn status_is_write_once() {
        let mut sink = MeasuredResponse::new(BufferedResponse::new());
        sink.write_header(StatusCode::BAD_REQUEST);
        sink.write_header(StatusCode::FORBIDDEN);

        assert_eq!(sink.status(), StatusCode::BAD_REQUEST);
        assert_eq!(sink.into_inner().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn status_defaults_to_ok() {
        let sink = MeasuredResponse::new(BufferedResponse::new());
        assert_eq!(sink.status(), StatusCode::OK);
        assert!(!sink.has_written_headers());
    }

    #[test]
    fn has_written_headers_after_write_header() {
        let mut sink = MeasuredResponse::new(BufferedResponse::new());
        sink.write_header(StatusCode::CREATED);
        assert!(sink.has_written_headers());
    }

    #[test]
    fn body_write_commits_ok() {
        let mut sink = MeasuredResponse::new(BufferedResponse::new());
        sink.write(b"x").unwrap();
        sink.write_header(StatusCode::INTERNAL_SERVER_ERROR);

        assert!(sink.has_written_headers());
        assert_eq!(sink.status(), StatusCode::OK);
    }

    #[test]
    fn short_durations_are_floored() {
        let sink = MeasuredResponse::new(BufferedResponse::new());
        assert_eq!(sink.duration(), Duration::ZERO);
    }

    #[test]
    fn measures_elapsed_time() {
        let sink = MeasuredResponse::new(BufferedResponse::new());
        thread::sleep(Duration::from_millis(50));

        let elapsed = sink.duration();
        assert!(elapsed >= Duration::from_millis(50), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    }

    #[test]
    fn headers_are_frozen_once_the_status_is_sent() {
        let mut sink = MeasuredResponse::new(BufferedResponse::new());
        sink.set_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        sink.write_header(StatusCode::OK);
        sink.set_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        sink.headers_mut().insert("x-late", HeaderValue::from_static("1"));

        let buffered = sink.into_inner();
        assert_eq!(buffered.header("content-type"), Some("text/plain"));
        assert_eq!(buffered.header("x-late"), None);
    }

    #[test]
    fn refuses_bytes_past_the_declared_length() {
        let mut sink = MeasuredResponse::new(BufferedResponse::new());
        sink.set_header(CONTENT_LENGTH, HeaderValue::from(5_usize));
        sink.write(b"hello").unwrap();

        let err = sink.write(b" world").unwrap_err();
        assert!(err.to_string().contains("Content-Length of 5"), "{err}");
        assert_eq!(sink.volume(), 5);
        assert_eq!(sink.into_inner().body(), b"hello");
    }

    #[test]
    fn converts_into_a_hyper_response() {
        let mut buffered = BufferedResponse::new();
        buffered.write_header(StatusCode::ACCEPTED);
        buffered.write(b"queued").unwrap();

        let response = buffered.into_http();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
