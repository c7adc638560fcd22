//! Self-validation for request models.
//!
//! Structural checks (is it JSON, does it have the right shape) belong to
//! serde. Semantic checks (is the quantity positive, is the name allowed)
//! belong to the model itself, through [`Validate`]. Keeping them on the
//! model keeps them out of the handlers.

use std::fmt;

/// A semantic check a decoded request model runs on itself.
///
/// ```rust
/// use keel::{InvalidField, Validate};
///
/// #[derive(serde::Deserialize)]
/// struct NewWidget { name: String }
///
/// impl Validate for NewWidget {
///     fn validate(&self) -> Result<(), InvalidField> {
///         if self.name.trim().is_empty() {
///             return Err(InvalidField::new("name", "must not be blank"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validate {
    /// Returns the first invalid field, or `Ok(())` if the model is valid.
    fn validate(&self) -> Result<(), InvalidField>;
}

/// The first field that failed validation and why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct InvalidField {
    pub field: String,
    pub message: String,
}

impl InvalidField {
    pub fn new(field: impl Into<String>, message: impl fmt::Display) -> Self {
        Self { field: field.into(), message: message.to_string() }
    }
}
