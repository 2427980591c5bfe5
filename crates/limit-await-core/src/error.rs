//! Common error types for limit-await.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors shared by the limit-await crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// A cluster object is missing a field the model requires.
    #[error("missing field `{field}` on {kind}")]
    MissingField {
        /// Kind of the object, e.g. "Pod".
        kind: &'static str,
        /// Name of the missing field.
        field: &'static str,
    },
}
