//! Error types for the quest-log engine.
//!
//! Every failure is a constraint violation surfaced synchronously to the
//! caller. None of them are retried.

use crate::world::LinkId;
use thiserror::Error;

/// Main error type for engine operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// An option set mixes weighted and unweighted members, or its weights
    /// are out of range.
    #[error("Inconsistent weighting: {reason}")]
    InconsistentWeighting { reason: String },

    /// Damage requested with negative points.
    #[error("Invalid damage amount: {points}")]
    InvalidDamageAmount { points: i64 },

    /// An entity violates a structural invariant.
    #[error("Validation conflict on {entity}: {reason}")]
    ValidationConflict {
        entity: &'static str,
        reason: String,
    },

    /// Two appends claimed the same log index. This is a serialization bug.
    #[error("Index conflict on log {link}: expected index {expected}, found {found}")]
    IndexConflict { link: LinkId, expected: u32, found: u32 },

    /// A log entry could not be rendered for export.
    #[error("Malformed log entry #{index} in {link}: {reason}")]
    MalformedEntry {
        link: LinkId,
        index: u32,
        reason: String,
    },

    /// A referenced entity does not exist in the store.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

impl CoreError {
    pub(crate) fn inconsistent(reason: impl Into<String>) -> Self {
        CoreError::InconsistentWeighting {
            reason: reason.into(),
        }
    }

    pub(crate) fn conflict(entity: &'static str, reason: impl Into<String>) -> Self {
        CoreError::ValidationConflict {
            entity,
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true for errors that indicate a bug rather than caller misuse.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::IndexConflict { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
