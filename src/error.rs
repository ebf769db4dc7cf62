//! Application error types.

use std::time::Duration;

use thiserror::Error;

/// Application-level errors for kgrag.
///
/// "No results" is never an error: retrieval and export return empty
/// payloads instead.
#[derive(Error, Debug)]
pub enum AppError {
    // Caller errors
    #[error("Unknown retrieval mode: {0}")]
    UnknownMode(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // Store errors
    #[error("Graph store unavailable: {0}")]
    StoreUnavailable(#[from] neo4rs::Error),

    #[error("Graph query error: {message}")]
    Query { message: String, query: String },

    #[error("Failed to decode store record: {0}")]
    Decode(String),

    // Call lifecycle
    #[error("Request cancelled")]
    Cancelled,

    #[error("Request exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    // Output contract
    #[error("Heavy field '{field}' leaked into output payload for {element_id}")]
    ContractViolation { element_id: String, field: String },

    // Config errors
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a caller may reasonably retry the same request.
    ///
    /// Retries are the caller's decision; nothing in this crate retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::StoreUnavailable(_) | AppError::DeadlineExceeded(_)
        )
    }

    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::UnknownMode(_) => "CONFIGURATION_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            AppError::Query { .. } => "QUERY_ERROR",
            AppError::Decode(_) => "DECODE_ERROR",
            AppError::Cancelled => "CANCELLED",
            AppError::DeadlineExceeded(_) => "DEADLINE_EXCEEDED",
            AppError::ContractViolation { .. } => "CONTRACT_VIOLATION",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Conditions that are recovered locally and only reported through logs.
///
/// These never reach the caller as errors; the affected part of the result
/// is truncated or omitted instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// A traversal hit its safety cap and was truncated.
    TraversalDepthExceeded {
        /// What was being traversed (e.g. "community parents").
        walk: &'static str,
        /// The cap that was enforced.
        cap: usize,
    },
    /// A traversal reached a node it had already visited and stopped there.
    CycleDetected {
        walk: &'static str,
        /// Element id where the cycle closed.
        at: String,
    },
    /// Some requested ids did not resolve and were omitted.
    PartialData {
        /// Kind of id (chunk, entity, relationship).
        kind: &'static str,
        /// Ids that did not resolve.
        missing: Vec<String>,
    },
}

impl Degradation {
    /// Emits the condition as a warning-level log event.
    pub fn report(&self) {
        match self {
            Degradation::TraversalDepthExceeded { walk, cap } => {
                tracing::warn!(walk, cap, "Traversal depth exceeded, result truncated");
            }
            Degradation::CycleDetected { walk, at } => {
                tracing::warn!(walk, at = %at, "Cycle detected, traversal stopped");
            }
            Degradation::PartialData { kind, missing } => {
                tracing::warn!(
                    kind,
                    missing = missing.len(),
                    ids = ?missing,
                    "Unresolvable ids omitted from result"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::DeadlineExceeded(Duration::from_secs(1)).is_retryable());
        assert!(!AppError::UnknownMode("nope".into()).is_retryable());
        assert!(!AppError::Cancelled.is_retryable());
    }

    #[test]
    fn test_unknown_mode_is_configuration_error() {
        let err = AppError::UnknownMode("bogus".into());
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
        assert_eq!(err.to_string(), "Unknown retrieval mode: bogus");
    }
}
