#![forbid(unsafe_code)]

//! Errors from field store operations.

/// Errors from addressing a field of a [`FieldStore`](crate::store::FieldStore).
///
/// The key set of a store is fixed at construction, so the only fallible
/// operation is naming a field the store has never had. Everything else
/// (redundant publishes, dead subscriptions, extra keys in a bulk update)
/// degrades to a no-op instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The named field was not part of the store's initial state.
    UnknownField {
        /// The field name that failed to resolve.
        field: String,
    },
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField { field } => write!(f, "unknown field: {field}"),
        }
    }
}

impl std::error::Error for FieldError {}
