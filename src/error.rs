//! Error taxonomy for extractor runs.
//!
//! Per-extractor failures (`MissingConfiguration` through `WriteError`) are
//! contained inside that extractor's `ExtractionResult` and never abort
//! sibling executions. `UnknownExtractor` is a request-validation error and
//! rejects the whole run before anything executes.

use serde::Serialize;
use thiserror::Error;

/// Stable failure-kind labels used in logs, ledger entries and run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    MissingConfiguration,
    AcquisitionFailure,
    ExtractionFailure,
    NormalizationError,
    Timeout,
    WriteError,
    UnknownExtractor,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MissingConfiguration => "MissingConfiguration",
            Self::AcquisitionFailure => "AcquisitionFailure",
            Self::ExtractionFailure => "ExtractionFailure",
            Self::NormalizationError => "NormalizationError",
            Self::Timeout => "Timeout",
            Self::WriteError => "WriteError",
            Self::UnknownExtractor => "UnknownExtractor",
        };
        f.write_str(s)
    }
}

/// A structured extraction failure.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// A required secret was absent; the extractor's `run()` was never invoked.
    #[error("{extractor}: missing configuration key '{key}'")]
    MissingConfiguration { extractor: String, key: String },

    /// The session/driver handle could not be obtained.
    #[error("{extractor}: session acquisition failed: {message}")]
    AcquisitionFailure { extractor: String, message: String },

    /// The extractor itself failed during `run()`.
    #[error("{extractor}: extraction failed: {message}")]
    ExtractionFailure { extractor: String, message: String },

    /// A raw record was not representable as the normalized output shape.
    #[error("{extractor}: normalization failed: {message}")]
    NormalizationError { extractor: String, message: String },

    /// Execution exceeded its time budget; the session was force-released.
    #[error("{extractor}: execution exceeded its {budget_secs}s budget")]
    Timeout { extractor: String, budget_secs: u64 },

    /// The artifact could not be persisted.
    #[error("{extractor}: artifact write failed: {message}")]
    WriteError { extractor: String, message: String },

    /// The requested selection named an unregistered extractor.
    #[error("unknown extractor(s): {names}")]
    UnknownExtractor { names: String },
}

impl ScrapeError {
    /// The taxonomy label for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingConfiguration { .. } => ErrorKind::MissingConfiguration,
            Self::AcquisitionFailure { .. } => ErrorKind::AcquisitionFailure,
            Self::ExtractionFailure { .. } => ErrorKind::ExtractionFailure,
            Self::NormalizationError { .. } => ErrorKind::NormalizationError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::WriteError { .. } => ErrorKind::WriteError,
            Self::UnknownExtractor { .. } => ErrorKind::UnknownExtractor,
        }
    }

    /// The extractor this failure belongs to, if any.
    pub fn extractor(&self) -> Option<&str> {
        match self {
            Self::MissingConfiguration { extractor, .. }
            | Self::AcquisitionFailure { extractor, .. }
            | Self::ExtractionFailure { extractor, .. }
            | Self::NormalizationError { extractor, .. }
            | Self::Timeout { extractor, .. }
            | Self::WriteError { extractor, .. } => Some(extractor),
            Self::UnknownExtractor { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels_are_stable() {
        let err = ScrapeError::Timeout {
            extractor: "goodreads".to_string(),
            budget_secs: 25,
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.kind().to_string(), "Timeout");
        assert_eq!(err.extractor(), Some("goodreads"));
    }

    #[test]
    fn test_unknown_extractor_has_no_owner() {
        let err = ScrapeError::UnknownExtractor {
            names: "nope".to_string(),
        };
        assert_eq!(err.extractor(), None);
        assert!(err.to_string().contains("nope"));
    }
}
