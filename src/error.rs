//! Typed error surface shared across the engine.
//!
//! Two families exist: user-recoverable validation/configuration failures,
//! which surface immediately, and the internal fallback signals
//! ([`Error::UnsupportedPredicate`], [`Error::MissingSelectiveField`]) that the
//! executor catches to retry on a safer path.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Structured errors emitted by the query engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Query construction or argument validation failed.
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        /// Machine-readable pointer to the offending field or AST node.
        path: Option<String>,
        suggestion: Option<String>,
    },
    /// Engine or caller configuration is inconsistent.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        details: BTreeMap<String, String>,
        suggestion: Option<String>,
    },
    /// A referenced node does not exist.
    #[error("node '{id}' not found")]
    NodeNotFound { id: String },
    /// A referenced edge does not exist.
    #[error("edge '{id}' not found")]
    EdgeNotFound { id: String },
    /// An edge endpoint references a missing node.
    #[error("endpoint '{id}' not found for edge '{edge}'")]
    EndpointNotFound { edge: String, id: String },
    /// Optimistic version check failed during a write.
    #[error("version conflict on '{id}': expected {expected}, found {found}")]
    VersionConflict {
        id: String,
        expected: i64,
        found: i64,
    },
    /// Delete blocked by a restrict policy on a connected edge.
    #[error("delete of '{id}' restricted by edge kind '{edge_kind}'")]
    RestrictedDelete { id: String, edge_kind: String },
    /// Stored data does not match the declared schema.
    #[error("schema mismatch for kind '{kind}': {message}")]
    SchemaMismatch { kind: String, message: String },
    /// Migration bookkeeping failure.
    #[error("migration error: {message}")]
    Migration { message: String },
    /// The active dialect cannot express a predicate shape.
    ///
    /// Internal fallback signal: the executor retries on the full-blob path.
    #[error("unsupported predicate: {message}")]
    UnsupportedPredicate { message: String },
    /// A node or edge kind name is absent from the graph definition.
    #[error("kind '{kind}' not found")]
    KindNotFound { kind: String },
    /// Unique constraint violated.
    #[error("uniqueness violation on '{kind}.{field}'")]
    Uniqueness { kind: String, field: String },
    /// Cardinality constraint violated.
    #[error("cardinality violation on edge kind '{kind}': {message}")]
    Cardinality { kind: String, message: String },
    /// Edge endpoint kind is not declared for the edge.
    #[error("edge kind '{kind}' does not accept {side} kind '{endpoint_kind}'")]
    Endpoint {
        kind: String,
        side: &'static str,
        endpoint_kind: String,
    },
    /// Disjointness constraint violated between kinds.
    #[error("disjoint kinds: {message}")]
    Disjoint { message: String },
    /// A selective row plan did not include a field the select callback read.
    ///
    /// Internal fallback signal: the executor retries on the full-blob path.
    #[error("selective plan missing field '{field}' on alias '{alias}'")]
    MissingSelectiveField { alias: String, field: String },
    /// The backend failed to run a statement.
    #[error("backend error: {message}")]
    Backend {
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Builds a [`Error::Validation`] with just a message.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            path: None,
            suggestion: None,
        }
    }

    /// Builds a [`Error::Validation`] pointing at a specific field or AST node.
    pub fn validation_at(message: impl Into<String>, path: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            path: Some(path.into()),
            suggestion: None,
        }
    }

    /// Attaches a remediation hint to a validation or configuration error.
    pub fn with_suggestion(mut self, hint: impl Into<String>) -> Self {
        match &mut self {
            Error::Validation { suggestion, .. } | Error::Configuration { suggestion, .. } => {
                *suggestion = Some(hint.into());
            }
            _ => {}
        }
        self
    }

    /// Builds a [`Error::Configuration`] with just a message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            details: BTreeMap::new(),
            suggestion: None,
        }
    }

    /// Builds a [`Error::Configuration`] carrying structured details.
    pub fn configuration_with(
        message: impl Into<String>,
        details: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Error::Configuration {
            message: message.into(),
            details: details.into_iter().collect(),
            suggestion: None,
        }
    }

    /// Builds a [`Error::UnsupportedPredicate`] signal.
    pub fn unsupported_predicate(message: impl Into<String>) -> Self {
        Error::UnsupportedPredicate {
            message: message.into(),
        }
    }

    /// Builds a [`Error::Backend`] wrapping the driver error.
    pub fn backend(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Backend {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// True for the two internal signals the executor recovers from locally.
    pub fn is_fallback_signal(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedPredicate { .. } | Error::MissingSelectiveField { .. }
        )
    }

    /// Returns a machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "ValidationError",
            Error::Configuration { .. } => "ConfigurationError",
            Error::NodeNotFound { .. } => "NodeNotFoundError",
            Error::EdgeNotFound { .. } => "EdgeNotFoundError",
            Error::EndpointNotFound { .. } => "EndpointNotFoundError",
            Error::VersionConflict { .. } => "VersionConflictError",
            Error::RestrictedDelete { .. } => "RestrictedDeleteError",
            Error::SchemaMismatch { .. } => "SchemaMismatchError",
            Error::Migration { .. } => "MigrationError",
            Error::UnsupportedPredicate { .. } => "UnsupportedPredicateError",
            Error::KindNotFound { .. } => "KindNotFoundError",
            Error::Uniqueness { .. } => "UniquenessError",
            Error::Cardinality { .. } => "CardinalityError",
            Error::Endpoint { .. } => "EndpointError",
            Error::Disjoint { .. } => "DisjointError",
            Error::MissingSelectiveField { .. } => "MissingSelectiveFieldError",
            Error::Backend { .. } => "BackendError",
        }
    }
}

/// Formats an error together with its machine-readable code.
pub struct ErrorWithCode<'a>(pub &'a Error);

impl fmt::Display for ErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
