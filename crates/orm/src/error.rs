//! Errors

use thiserror::Error;

use crate::value::Value;

/// Result type used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Commit phase in which a buffered operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Buffered inserts (and cascaded child inserts).
    Insert,
    /// Buffered updates (and cascaded child writes).
    Update,
    /// Buffered deletes (and cascaded child deletes).
    Delete,
    /// Closing the shared transaction after every write succeeded.
    Commit,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insert => f.write_str("insert"),
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
            Self::Commit => f.write_str("commit"),
        }
    }
}

/// Domain level error type returned by compilers, adapters and stores.
#[derive(Error, Debug)]
pub enum Error {
    // --- Predicate errors ---
    /// A predicate node cannot be translated or evaluated in its position.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// The operator has no counterpart in the target query dialect.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    // --- Schema errors ---
    /// No field matches the key naming convention.
    #[error("no key property on entity {entity}")]
    NoKeyProperty {
        /// Entity lacking a key.
        entity: &'static str,
    },

    /// The requested key is not a scalar field of the entity.
    #[error("invalid key property {field} on entity {entity}")]
    InvalidKeyProperty {
        /// Entity the key was requested for.
        entity: &'static str,
        /// Requested key name.
        field: String,
    },

    /// A field name does not belong to the entity.
    #[error("unknown field {field} on entity {entity}")]
    UnknownField {
        /// Entity that was queried.
        entity: &'static str,
        /// Name that matched no field.
        field: String,
    },

    /// A stored value cannot be assigned to the field's semantic type.
    #[error("cannot materialize field {field} from value {value}")]
    Materialization {
        /// Field being assigned.
        field: String,
        /// Stored value that was rejected.
        value: Value,
    },

    /// No data store has been registered for the entity type.
    #[error("no data store registered for entity {0}")]
    UnregisteredEntity(&'static str),

    // --- Query errors ---
    /// A single-result query matched nothing.
    #[error("no {entity} matches the specification")]
    NotFound {
        /// Entity that was queried.
        entity: &'static str,
    },

    /// A single-result query matched more than one entity.
    #[error("{count} {entity} entities match the specification, expected one")]
    AmbiguousResult {
        /// Entity that was queried.
        entity: &'static str,
        /// Number of matches.
        count: usize,
    },

    // --- Backend errors ---
    /// The backing store failed to execute an operation.
    #[error("backend execution failed: {0:#}")]
    BackendExecution(#[source] anyhow::Error),

    /// A unit of work commit failed part way through its batch.
    #[error(
        "commit failed during {phase} of {entity} after {applied} applied operation(s), {}: {source}",
        boundary(.rolled_back)
    )]
    Commit {
        /// Number of adapter operations that completed before the failure.
        applied: usize,
        /// Whether the whole batch was rolled back by the shared backend.
        rolled_back: bool,
        /// Entity whose operation failed.
        entity: &'static str,
        /// Phase in which the failure occurred.
        phase: Phase,
        /// The underlying failure.
        source: Box<Self>,
    },
}

const fn boundary(rolled_back: &bool) -> &'static str {
    if *rolled_back { "batch rolled back" } else { "earlier changes remain applied" }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        // keep typed errors that were only wrapped with context
        match err.downcast::<Self>() {
            Ok(inner) => inner,
            Err(err) => Self::BackendExecution(err),
        }
    }
}

/// Creates an [`Error::UnsupportedExpression`] from a format string.
#[macro_export]
macro_rules! unsupported {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::UnsupportedExpression(format!($fmt, $($arg)*))
    };
    ($desc:expr $(,)?) => {
        $crate::Error::UnsupportedExpression(format!($desc))
    };
}

#[cfg(test)]
mod tests {
    use anyhow::{Context, anyhow};

    use super::*;

    #[test]
    fn error_display() {
        let err = unsupported!("{} is not a truth value", "[name]");
        assert_eq!(err.to_string(), "unsupported expression: [name] is not a truth value");

        let err = Error::AmbiguousResult { entity: "Person", count: 2 };
        assert_eq!(err.to_string(), "2 Person entities match the specification, expected one");
    }

    #[test]
    fn anyhow_context_is_backend_error() {
        let result = Err::<(), anyhow::Error>(anyhow!("disk full")).context("inserting row");
        let err: Error = result.unwrap_err().into();

        assert!(matches!(err, Error::BackendExecution(_)));
        assert_eq!(err.to_string(), "backend execution failed: inserting row: disk full");
    }

    #[test]
    fn typed_error_survives_anyhow() {
        let wrapped = anyhow::Error::new(Error::NotFound { entity: "Person" });
        let err: Error = wrapped.into();
        assert!(matches!(err, Error::NotFound { entity: "Person" }));
    }

    #[test]
    fn commit_error_reports_boundary() {
        let err = Error::Commit {
            applied: 3,
            rolled_back: false,
            entity: "Identification",
            phase: Phase::Insert,
            source: Box::new(Error::BackendExecution(anyhow!("constraint failed"))),
        };
        assert_eq!(
            err.to_string(),
            "commit failed during insert of Identification after 3 applied operation(s), earlier \
             changes remain applied: backend execution failed: constraint failed"
        );
    }
}
