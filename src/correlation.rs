//! Per-request correlation identifiers.

use std::fmt;

use http::HeaderValue;
use http::header::HeaderName;
use uuid::Uuid;

/// Response header carrying the request's [`CorrelationId`].
pub const CORRELATION_ID: HeaderName = HeaderName::from_static("correlation-id");

/// An opaque, globally unique identifier attached to every response.
///
/// Generated as a UUID v7 so identifiers sort by creation time in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub(crate) fn header_value(&self) -> HeaderValue {
        let mut buf = Uuid::encode_buffer();
        let text = self.0.hyphenated().encode_lower(&mut buf);
        // A hyphenated UUID is always visible ASCII.
        HeaderValue::from_str(text).unwrap_or_else(|_| HeaderValue::from_static(""))
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_unique() {
        assert_ne!(CorrelationId::generate(), CorrelationId::generate());
    }

    #[test]
    fn header_value_matches_display() {
        let id = CorrelationId::generate();
        assert_eq!(id.header_value().to_str().unwrap(), id.to_string());
        assert_eq!(id.as_uuid().get_version_num(), 7);
    }
}
