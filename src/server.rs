//! HTTP transport and graceful shutdown.
//!
//! The server owns sockets and connections; the [`Dispatcher`] owns
//! everything that happens to a request. Per request the server:
//!
//! 1. Buffers the body (`http-body-util`), refusing anything over the body
//!    limit with a 413 before it is read into memory.
//! 2. Hands the request to the dispatcher on tokio's blocking pool, since
//!    handlers are synchronous.
//! 3. Sends back whatever the dispatcher produced.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** (Kubernetes, `kubectl delete`) or **Ctrl-C** the server
//! stops accepting connections, lets every in-flight connection finish, then
//! returns from [`Server::serve`].

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http::StatusCode;
use http::header::CONTENT_LENGTH;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::Error;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    body_limit: Option<usize>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use keel::Server;
    /// let server = Server::bind(([0, 0, 0, 0], 3000));
    /// ```
    pub fn bind(addr: impl Into<SocketAddr>) -> Self {
        Self { addr: addr.into(), body_limit: None }
    }

    /// Largest request body the server will buffer, in bytes.
    ///
    /// Defaults to the dispatcher's [`Config::json_body_limit`](crate::Config::json_body_limit).
    /// Larger bodies are answered with a 413 problem and never reach a handler.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = Some(limit);
        self
    }

    /// Starts accepting connections and dispatching them through `dispatcher`.
    ///
    /// Returns only after a full graceful shutdown.
    pub async fn serve(self, dispatcher: Dispatcher) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_listener(listener, dispatcher, shutdown_signal()).await
    }

    /// Serves on an already-bound listener until `shutdown` resolves.
    ///
    /// Useful for tests (bind port 0) and for callers with their own
    /// shutdown trigger.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        dispatcher: Dispatcher,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let body_limit = self
            .body_limit
            .unwrap_or_else(|| usize::try_from(dispatcher.config().json_body_limit).unwrap_or(0));

        info!(addr = %listener.local_addr()?, body_limit, "keel listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM immediately stops
                // accepting, even if more connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = dispatcher.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let dispatcher = dispatcher.clone();
                            async move { Ok::<_, Infallible>(dispatch(dispatcher, body_limit, req).await) }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(%peer, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("keel stopped");
        Ok(())
    }
}

/// Buffers the body up to `limit` and runs the dispatcher on the blocking pool.
async fn dispatch(
    dispatcher: Dispatcher,
    limit: usize,
    req: hyper::Request<Incoming>,
) -> http::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let max = i64::try_from(limit).unwrap_or(i64::MAX);

    // A declared length over the limit is refused without reading a byte.
    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok());
    if let Some(length) = declared.filter(|&length| length > max) {
        warn!(path = parts.uri.path(), length, max, "request body over the limit");
        let request = http::Request::from_parts(parts, Bytes::new());
        // Runs no handler code, so it stays on the reactor.
        return dispatcher.reject_too_large(request, length, max);
    }

    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            // No usable length was declared; all we know is that more than
            // `max` bytes arrived.
            warn!(path = parts.uri.path(), max, "streamed request body over the limit");
            let request = http::Request::from_parts(parts, Bytes::new());
            return dispatcher.reject_too_large(request, max.saturating_add(1), max);
        }
        Err(e) => {
            warn!(path = parts.uri.path(), "failed to read request body: {e}");
            return bare(StatusCode::BAD_REQUEST);
        }
    };

    let request = http::Request::from_parts(parts, body);
    match tokio::task::spawn_blocking(move || dispatcher.handle_http(request)).await {
        Ok(response) => response,
        Err(e) => {
            // The dispatcher catches handler panics itself; reaching this
            // means the blocking task was cancelled or the runtime is stopping.
            error!("dispatch task failed: {e}");
            bare(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn bare(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available. If a handler cannot be installed
/// that signal is never awaited.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves, so on non-Unix platforms the SIGTERM arm
    // is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
