//! Error types for the core layer.

use crate::key::{KeyError, UsageKey};
use crate::schema::FieldType;

/// Errors at the core layer.
///
/// These are programmer/author errors: they are surfaced to the caller
/// immediately and never recovered from silently.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Key validation error.
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// No schema is registered for a block category.
    #[error("unknown block category '{category}'")]
    UnknownCategory { category: String },

    /// The field is not part of the category's schema.
    #[error("field '{field}' is not declared for category '{category}'")]
    FieldNotDeclared { category: String, field: String },

    /// A value does not match the field's declared type.
    #[error("field '{field}' expects {expected}, got {found}")]
    FieldType {
        field: String,
        expected: FieldType,
        found: &'static str,
    },

    /// A user-scoped field was accessed without a learner.
    #[error("field '{field}' is user-scoped and requires a learner")]
    MissingUser { field: String },

    /// The usage is not part of the tree.
    #[error("unknown usage {usage}")]
    UnknownUsage { usage: UsageKey },

    /// The usage is already part of the tree.
    #[error("usage {usage} is already in the tree")]
    DuplicateUsage { usage: UsageKey },

    /// Re-parenting would make a usage its own ancestor.
    #[error("moving {usage} under {parent} would create a cycle")]
    Cycle { usage: UsageKey, parent: UsageKey },

    /// Generic error with message.
    #[error("{message}")]
    Other { message: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage_key;

    #[test]
    fn field_not_declared_display() {
        let e = Error::FieldNotDeclared {
            category: "html".to_string(),
            field: "max_count".to_string(),
        };
        let display = e.to_string();
        assert!(display.contains("max_count"));
        assert!(display.contains("html"));
    }

    #[test]
    fn field_type_display() {
        let e = Error::FieldType {
            field: "graded".to_string(),
            expected: FieldType::Boolean,
            found: "string",
        };
        assert_eq!(e.to_string(), "field 'graded' expects boolean, got string");
    }

    #[test]
    fn key_error_conversion() {
        let key_err = KeyError::InvalidKey {
            message: "test".to_string(),
        };
        let e: Error = key_err.into();
        assert!(matches!(e, Error::Key(_)));
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn cycle_display() {
        let e = Error::Cycle {
            usage: usage_key!("block-v1:o+c+r+type@chapter+block@a"),
            parent: usage_key!("block-v1:o+c+r+type@vertical+block@b"),
        };
        assert!(e.to_string().contains("cycle"));
    }
}
