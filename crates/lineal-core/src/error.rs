//! Error types for `lineal`.
//!
//! This module provides a unified error type for all cache operations.
//! Error codes follow the pattern `LINEAL-XXX` for easy debugging.

use thiserror::Error;

/// Result type alias for `lineal` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in `lineal` operations.
///
/// Each variant includes a descriptive error message suitable for end-users.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (LINEAL-001).
    ///
    /// Unknown policy names, malformed cache types, or invalid limits,
    /// surfaced at initialization time.
    #[error("[LINEAL-001] Configuration error: {0}")]
    Config(String),

    /// Lineage invariant violated (LINEAL-002).
    ///
    /// An inner DAG node with an empty opcode, or a malformed placeholder.
    #[error("[LINEAL-002] Lineage invariant violated: {0}")]
    LineageInvariant(String),

    /// Cost model invoked on an instruction category it cannot score (LINEAL-003).
    #[error("[LINEAL-003] Unsupported cost estimate for opcode '{0}'")]
    Unsupported(String),

    /// IO error (LINEAL-004).
    #[error("[LINEAL-004] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Spill blob serialization error (LINEAL-005).
    #[error("[LINEAL-005] Serialization error: {0}")]
    Serialization(String),

    /// Attempt to spill a valueless or scalar entry (LINEAL-006).
    #[error("[LINEAL-006] Invalid spill: {0}")]
    SpillInvalid(String),

    /// Internal error (LINEAL-007).
    ///
    /// Indicates an unexpected internal error. Please report if encountered.
    #[error("[LINEAL-007] Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code (e.g., "LINEAL-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "LINEAL-001",
            Self::LineageInvariant(_) => "LINEAL-002",
            Self::Unsupported(_) => "LINEAL-003",
            Self::Io(_) => "LINEAL-004",
            Self::Serialization(_) => "LINEAL-005",
            Self::SpillInvalid(_) => "LINEAL-006",
            Self::Internal(_) => "LINEAL-007",
        }
    }

    /// Returns true if this error is recoverable.
    ///
    /// The cache is best-effort: recoverable errors degrade to cache-absent
    /// behavior. Invariant violations and programmer errors are not
    /// recoverable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::LineageInvariant(_) | Self::SpillInvalid(_) | Self::Internal(_)
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
