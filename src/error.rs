//! Error types for the separation pipeline
//!
//! Every failure is surfaced to the caller unmodified, wrapped with the
//! pipeline stage it came from. No retries, no fallbacks, no partial
//! results.

use std::fmt;

/// Top-level error type for the cseparate public API.
#[derive(Debug, Clone, PartialEq)]
pub enum SeparationError {
    /// STFT analysis or synthesis failure.
    Stft(String),
    /// The pre-emphasis curve fit did not converge.
    FitConvergence(String),
    /// Factorization failure (JADE or SVD numerical breakdown).
    Factorization(String),
    /// Incompatible matrix or signal dimensions (e.g. more components
    /// than available rank, or a signal shorter than one frame).
    DimensionMismatch(String),
}

impl fmt::Display for SeparationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeparationError::Stft(msg) => write!(f, "STFT error: {}", msg),
            SeparationError::FitConvergence(msg) => write!(f, "curve fit error: {}", msg),
            SeparationError::Factorization(msg) => write!(f, "factorization error: {}", msg),
            SeparationError::DimensionMismatch(msg) => write!(f, "dimension mismatch: {}", msg),
        }
    }
}

impl std::error::Error for SeparationError {}

/// Convenience alias so callers can write `Result<T>` instead of
/// `Result<T, SeparationError>`.
pub type Result<T> = std::result::Result<T, SeparationError>;
