//! Unified error type.

use http::Method;

/// The error type returned by keel's fallible operations.
///
/// Request-level failures (404, 415, 422, etc.) are expressed as
/// [`Problem`](crate::Problem) responses written through the
/// [`Context`](crate::Context), not as `Error`s. This type surfaces setup and
/// infrastructure failures: a bad route table, bad configuration, or a socket
/// that cannot be bound.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid route `{path}`: {source}")]
    InvalidRoute {
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("route path is empty")]
    EmptyPath,

    #[error("route `{method} {path}` is registered more than once")]
    DuplicateRoute { method: Method, path: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}
