//! Problem envelopes: the JSON body of every error response.
//!
//! ```json
//! {
//!   "type": "https://errors.example.com/http/not-found",
//!   "title": "Not Found",
//!   "detail": "The User '1234' was not found.",
//!   "specifics": { "subject": "1234", "subjectType": "User" }
//! }
//! ```
//!
//! `error` carries raw diagnostic text and is only attached when
//! [`Config::debugging_enabled`] is set. `specifics` keys serialize in sorted
//! order.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::Config;
use crate::format::friendly_size;

pub const UNSUPPORTED_MEDIA_TYPE: &str = "http/unsupported-media-type";
pub const REQUEST_ENTITY_TOO_LARGE: &str = "http/request-entity-too-large";
pub const LENGTH_REQUIRED: &str = "http/length-required";
pub const METHOD_NOT_ALLOWED: &str = "http/method-not-allowed";
pub const DESERIALIZATION: &str = "json/deserialization";
pub const UNPROCESSABLE_ENTITY: &str = "http/unprocessable-entity";
pub const NOT_FOUND: &str = "http/not-found";
pub const INTERNAL_SERVER_ERROR: &str = "http/internal-server-error";

/// A machine-readable error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub type_uri: String,
    pub title: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifics: Option<Map<String, Value>>,
    #[serde(skip)]
    status: StatusCode,
}

impl Problem {
    fn new(
        config: &Config,
        status: StatusCode,
        category: &str,
        title: &str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            type_uri: format!("{}/{category}", config.problem_type_prefix),
            title: title.to_owned(),
            detail: detail.into(),
            error: None,
            specifics: None,
            status,
        }
    }

    fn with_specific(mut self, key: &str, value: Value) -> Self {
        self.specifics
            .get_or_insert_with(Map::new)
            .insert(key.to_owned(), value);
        self
    }

    /// Attaches `err` as diagnostic text when debugging is enabled.
    fn with_error(mut self, config: &Config, err: &dyn fmt::Display) -> Self {
        if config.debugging_enabled {
            self.error = Some(err.to_string());
        }
        self
    }

    pub fn unsupported_media_type(config: &Config, provided: &str, allowed: &[&str]) -> Self {
        Self::new(
            config,
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UNSUPPORTED_MEDIA_TYPE,
            "Unsupported Media Type",
            format!("The Content-Type '{provided}' is not supported by this endpoint."),
        )
        .with_specific("providedContentType", json!(provided))
        .with_specific("allowedContentTypes", json!(allowed))
    }

    pub fn request_entity_too_large(config: &Config, length: i64, max: i64) -> Self {
        Self::new(
            config,
            StatusCode::PAYLOAD_TOO_LARGE,
            REQUEST_ENTITY_TOO_LARGE,
            "Request Entity Too Large",
            format!(
                "The provided request entity of length {} ({length} bytes) exceeds the maximum of {} ({max} bytes) on this endpoint.",
                friendly_size(length),
                friendly_size(max),
            ),
        )
        .with_specific("contentLength", json!(length))
        .with_specific("maximumContentLength", json!(max))
    }

    pub fn length_required(config: &Config) -> Self {
        Self::new(
            config,
            StatusCode::LENGTH_REQUIRED,
            LENGTH_REQUIRED,
            "Length Required",
            "This endpoint requires that the Content-Length header be set to a positive, non-zero value.",
        )
    }

    pub fn method_not_allowed(config: &Config, used: &str, allowed: &[&str]) -> Self {
        Self::new(
            config,
            StatusCode::METHOD_NOT_ALLOWED,
            METHOD_NOT_ALLOWED,
            "Method Not Allowed",
            format!("This endpoint does not allow use of the '{used}' method."),
        )
        .with_specific("methodUsed", json!(used))
        .with_specific("allowedMethods", json!(allowed))
    }

    pub fn deserialization(config: &Config, err: &dyn fmt::Display) -> Self {
        Self::new(
            config,
            StatusCode::BAD_REQUEST,
            DESERIALIZATION,
            "Deserialization Error",
            "The provided request body could not be meaningfully deserialized.  It appears to be invalid.",
        )
        .with_error(config, err)
    }

    pub fn unprocessable_entity(config: &Config, field: &str, err: &dyn fmt::Display) -> Self {
        Self::new(
            config,
            StatusCode::UNPROCESSABLE_ENTITY,
            UNPROCESSABLE_ENTITY,
            "Unprocessable Entity",
            "The provided request body was understood but contained some invalid values.",
        )
        .with_specific("field", json!(field))
        .with_specific("error", json!(err.to_string()))
    }

    pub fn not_found(config: &Config, subject_type: &str, subject: &str) -> Self {
        Self::new(
            config,
            StatusCode::NOT_FOUND,
            NOT_FOUND,
            "Not Found",
            format!("The {subject_type} '{subject}' was not found."),
        )
        .with_specific("subjectType", json!(subject_type))
        .with_specific("subject", json!(subject))
    }

    pub fn internal_server_error(config: &Config, err: &dyn fmt::Display) -> Self {
        Self::new(
            config,
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            "An internal server error prevented the request from completing.",
        )
        .with_error(config, err)
    }

    /// The body sent when a response model itself fails to serialize.
    pub fn serialization_failure(config: &Config, err: &dyn fmt::Display) -> Self {
        Self::new(
            config,
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            "Serialization of the response model failed.",
        )
        .with_error(config, err)
    }

    /// The status code that accompanies this problem's category.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(debugging_enabled: bool) -> Config {
        Config::default()
            .with_problem_type_prefix("https://testi.ng")
            .with_debugging(debugging_enabled)
    }

    #[test]
    fn unsupported_media_type_serializes_sorted_specifics() {
        let problem = Problem::unsupported_media_type(&config(true), "image/jpeg", &["image/PNG", "image/gif"]);

        assert_eq!(
            serde_json::to_string(&problem).unwrap(),
            r#"{"type":"https://testi.ng/http/unsupported-media-type","title":"Unsupported Media Type","detail":"The Content-Type 'image/jpeg' is not supported by this endpoint.","specifics":{"allowedContentTypes":["image/PNG","image/gif"],"providedContentType":"image/jpeg"}}"#
        );
        assert_eq!(problem.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn too_large_echoes_lengths_and_friendly_sizes() {
        let problem = Problem::request_entity_too_large(&config(false), 13, 12);

        assert_eq!(
            problem.detail,
            "The provided request entity of length 13.00 B (13 bytes) exceeds the maximum of 12.00 B (12 bytes) on this endpoint."
        );
        let specifics = problem.specifics.as_ref().unwrap();
        assert_eq!(specifics["contentLength"], 13);
        assert_eq!(specifics["maximumContentLength"], 12);
        assert_eq!(problem.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn length_required_has_no_specifics() {
        let json = serde_json::to_string(&Problem::length_required(&config(true))).unwrap();
        assert_eq!(
            json,
            r#"{"type":"https://testi.ng/http/length-required","title":"Length Required","detail":"This endpoint requires that the Content-Length header be set to a positive, non-zero value."}"#
        );
    }

    #[test]
    fn error_text_is_gated_by_debugging() {
        let hidden = Problem::internal_server_error(&config(false), &"database on fire");
        assert_eq!(hidden.error, None);

        let shown = Problem::internal_server_error(&config(true), &"database on fire");
        assert_eq!(shown.error.as_deref(), Some("database on fire"));
        assert_eq!(
            serde_json::to_string(&shown).unwrap(),
            r#"{"type":"https://testi.ng/http/internal-server-error","title":"Internal Server Error","detail":"An internal server error prevented the request from completing.","error":"database on fire"}"#
        );
    }

    #[test]
    fn unprocessable_entity_always_carries_the_validation_message() {
        let problem = Problem::unprocessable_entity(&config(false), "name", &"cannot be 'bad'");
        let specifics = problem.specifics.as_ref().unwrap();

        assert_eq!(specifics["field"], "name");
        assert_eq!(specifics["error"], "cannot be 'bad'");
        assert_eq!(problem.error, None);
        assert_eq!(problem.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn categories_map_to_statuses() {
        let c = config(false);
        assert_eq!(Problem::length_required(&c).status(), StatusCode::LENGTH_REQUIRED);
        assert_eq!(Problem::method_not_allowed(&c, "GET", &["POST"]).status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(Problem::deserialization(&c, &"eof").status(), StatusCode::BAD_REQUEST);
        assert_eq!(Problem::not_found(&c, "User", "1").status(), StatusCode::NOT_FOUND);
        assert_eq!(Problem::serialization_failure(&c, &"nope").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_reads_naturally() {
        let problem = Problem::not_found(&config(false), "User", "1234");
        assert_eq!(problem.detail, "The User '1234' was not found.");
        assert_eq!(problem.to_string(), "Not Found: The User '1234' was not found.");
    }
}
