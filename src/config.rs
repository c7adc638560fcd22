//! Process-wide dispatch configuration.
//!
//! Built once at startup and shared read-only (`Arc<Config>`) by every request.
//!
//! # Environment variables
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `KEEL_PROBLEM_TYPE_PREFIX` | [`Config::problem_type_prefix`] | empty |
//! | `KEEL_DEBUG` | [`Config::debugging_enabled`] | `false` |
//! | `KEEL_JSON_BODY_LIMIT` | [`Config::json_body_limit`] | 1 MiB |

use serde::Deserialize;

use crate::error::Error;

/// Default ceiling for JSON request bodies: 1 MiB.
pub const DEFAULT_JSON_BODY_LIMIT: i64 = 1 << 20;

/// Global settings that shape how every request is answered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URI for problem `type` links, e.g. `https://errors.example.com`.
    pub problem_type_prefix: String,
    /// Includes raw error text in problem responses. Never enable in production.
    pub debugging_enabled: bool,
    /// Largest `Content-Length` accepted by [`Context::from_json`](crate::Context::from_json).
    pub json_body_limit: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            problem_type_prefix: String::new(),
            debugging_enabled: false,
            json_body_limit: DEFAULT_JSON_BODY_LIMIT,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults for
    /// unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(prefix) = lookup("KEEL_PROBLEM_TYPE_PREFIX") {
            config.problem_type_prefix = prefix.trim().trim_end_matches('/').to_owned();
        }

        if let Some(debug) = lookup("KEEL_DEBUG") {
            config.debugging_enabled = match debug.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "" | "0" | "false" | "no" | "off" => false,
                other => return Err(Error::Config(format!("KEEL_DEBUG: unrecognised value `{other}`"))),
            };
        }

        if let Some(limit) = lookup("KEEL_JSON_BODY_LIMIT") {
            config.json_body_limit = limit
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("KEEL_JSON_BODY_LIMIT: {e}")))?;
        }

        Ok(config)
    }

    pub fn with_problem_type_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.problem_type_prefix = prefix.into();
        self
    }

    pub fn with_debugging(mut self, enabled: bool) -> Self {
        self.debugging_enabled = enabled;
        self
    }

    pub fn with_json_body_limit(mut self, limit: i64) -> Self {
        self.json_body_limit = limit;
        self
    }
}
