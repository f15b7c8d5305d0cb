//! # Error Types
//!
//! Structured error taxonomy for the bridge model contract. These errors are
//! designed to be informative for both humans and LLMs: every variant names
//! the entity and field involved so a caller can correct the request and retry.
//!
//! ## Example
//!
//! ```rust
//! use bridge_core::errors::{BridgeError, BridgeResult};
//!
//! fn validate_density(density: f64) -> BridgeResult<()> {
//!     if density <= 0.0 {
//!         return Err(BridgeError::schema("material", "density", "must be positive"));
//!     }
//!     Ok(())
//! }
//!
//! assert_eq!(validate_density(-1.0).unwrap_err().error_code(), "SCHEMA_ERROR");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::{EntityKind, EntityRef};
use crate::validation::ValidationReport;

/// Result type alias for bridge_core operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Structured error type for provider operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling programmatic error handling by LLMs and other consumers.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum BridgeError {
    /// A field of an entity is invalid (out of range, missing, wrong variant)
    #[error("Invalid {entity} field '{field}': {constraint}")]
    Schema {
        entity: String,
        field: String,
        constraint: String,
    },

    /// An entity with this ID already exists
    #[error("Duplicate {kind} ID: {id}")]
    DuplicateId { kind: EntityKind, id: String },

    /// No entity with this ID exists
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// The mutation would leave a dangling reference
    #[error("Referential integrity violation on {target}: {reason}")]
    ReferentialIntegrity {
        target: EntityRef,
        reason: String,
        related: Vec<EntityRef>,
    },

    /// Construction stage ordering or activation history violated
    #[error("Construction stage {stage}: {reason}")]
    StageOrder { stage: u32, reason: String },

    /// Validation reported error-severity findings
    #[error("Model is not analysis-ready: {} error(s)", report.error_count())]
    NotAnalysisReady { report: ValidationReport },

    /// The external analysis engine cannot be reached
    #[error("Analysis engine '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// Analysis still running, poll again later
    #[error("Results for analysis {handle} are not ready yet")]
    ResultsNotReady { handle: String },

    /// The engine accepted the job but failed or rejected it
    #[error("Analysis failed: {reason}")]
    AnalysisFailed { reason: String },

    /// Configuration file or override is invalid
    #[error("Configuration error in '{key}': {reason}")]
    Config { key: String, reason: String },

    /// Generic internal error (should be rare)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BridgeError {
    /// Create a Schema error
    pub fn schema(entity: impl Into<String>, field: impl Into<String>, constraint: impl Into<String>) -> Self {
        BridgeError::Schema {
            entity: entity.into(),
            field: field.into(),
            constraint: constraint.into(),
        }
    }

    /// Create a DuplicateId error
    pub fn duplicate_id(kind: EntityKind, id: impl ToString) -> Self {
        BridgeError::DuplicateId { kind, id: id.to_string() }
    }

    /// Create a NotFound error
    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        BridgeError::NotFound {
            kind: kind.name().to_string(),
            id: id.to_string(),
        }
    }

    /// Create a NotFound error for an analysis handle
    pub fn unknown_handle(handle: impl ToString) -> Self {
        BridgeError::NotFound {
            kind: "analysis".to_string(),
            id: handle.to_string(),
        }
    }

    /// Create a ReferentialIntegrity error
    pub fn referential(target: EntityRef, reason: impl Into<String>, related: Vec<EntityRef>) -> Self {
        BridgeError::ReferentialIntegrity {
            target,
            reason: reason.into(),
            related,
        }
    }

    /// Create a StageOrder error
    pub fn stage_order(stage: u32, reason: impl Into<String>) -> Self {
        BridgeError::StageOrder {
            stage,
            reason: reason.into(),
        }
    }

    /// Create a BackendUnavailable error
    pub fn backend_unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Create a Config error
    pub fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::Config {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a recoverable error (the same call may succeed on retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BridgeError::BackendUnavailable { .. } | BridgeError::ResultsNotReady { .. }
        )
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::Schema { .. } => "SCHEMA_ERROR",
            BridgeError::DuplicateId { .. } => "DUPLICATE_ID",
            BridgeError::NotFound { .. } => "NOT_FOUND",
            BridgeError::ReferentialIntegrity { .. } => "REFERENTIAL_INTEGRITY",
            BridgeError::StageOrder { .. } => "STAGE_ORDER",
            BridgeError::NotAnalysisReady { .. } => "NOT_ANALYSIS_READY",
            BridgeError::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            BridgeError::ResultsNotReady { .. } => "RESULTS_NOT_READY",
            BridgeError::AnalysisFailed { .. } => "ANALYSIS_FAILED",
            BridgeError::Config { .. } => "CONFIG_ERROR",
            BridgeError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::schema("arguments", "json", e.to_string())
    }
}
