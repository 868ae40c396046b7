//! Requests, artifacts and the closed set of compilation outcomes.

use std::fmt;

use bytes::Bytes;
use thiserror::Error;

use super::error::DomainError;

/// Source text accepted for compilation.
///
/// Construction fails for empty or whitespace-only input, so holding a
/// `CompilationRequest` means the engine may be spawned for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationRequest {
    source: String,
}

impl CompilationRequest {
    pub fn new(source: impl Into<String>) -> Result<Self, DomainError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(DomainError::validation("No content provided"));
        }
        Ok(Self { source })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

/// A compiled PDF. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact(Bytes);

impl Artifact {
    /// Wrap the accumulated output, or `None` when the engine produced nothing.
    pub fn new(bytes: Bytes) -> Option<Self> {
        (!bytes.is_empty()).then_some(Self(bytes))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or whitespace-only source; rejected before anything is spawned.
    InvalidInput,
    /// The engine reported a failure; the message is its own diagnostic.
    EngineError,
    /// The engine exited cleanly but wrote no output.
    EmptyArtifact,
    /// The ceiling elapsed and the engine was killed.
    Timeout,
    /// Host-side fault outside the compilation itself.
    InternalError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::EngineError => "engine_error",
            ErrorKind::EmptyArtifact => "empty_artifact",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CompilationFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub hint: Option<String>,
}

impl CompilationFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<DomainError> for CompilationFailure {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { message } => Self::new(ErrorKind::InvalidInput, message),
        }
    }
}

/// The single outcome of one compilation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilationResult {
    Success(Artifact),
    Failure(CompilationFailure),
}

impl CompilationResult {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failure(CompilationFailure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CompilationResult::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            CompilationResult::Success(_) => None,
            CompilationResult::Failure(failure) => Some(failure.kind),
        }
    }

    /// Label used for logs and the `outcome` metric dimension.
    pub fn outcome(&self) -> &'static str {
        match self {
            CompilationResult::Success(_) => "succeeded",
            CompilationResult::Failure(failure) => failure.kind.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_source_is_rejected() {
        for source in ["", "   ", "\n\t  \r\n"] {
            let err = CompilationRequest::new(source).expect_err("blank source must fail");
            assert!(matches!(err, DomainError::Validation { .. }));
        }
    }

    #[test]
    fn surrounding_whitespace_is_preserved() {
        let request = CompilationRequest::new("  \\relax\n").expect("valid request");
        assert_eq!(request.source(), "  \\relax\n");
    }

    #[test]
    fn empty_bytes_do_not_make_an_artifact() {
        assert!(Artifact::new(Bytes::new()).is_none());
        let artifact = Artifact::new(Bytes::from_static(b"%PDF-1.5")).expect("non-empty");
        assert_eq!(artifact.len(), 8);
    }

    #[test]
    fn validation_errors_map_to_invalid_input() {
        let failure = CompilationFailure::from(DomainError::validation("No content provided"));
        assert_eq!(failure.kind, ErrorKind::InvalidInput);
        assert_eq!(failure.message, "No content provided");
        assert!(failure.hint.is_none());
    }

    #[test]
    fn outcome_labels_follow_error_kind() {
        let timeout = CompilationResult::failure(ErrorKind::Timeout, "ceiling reached");
        assert_eq!(timeout.outcome(), "timeout");
        assert_eq!(timeout.error_kind(), Some(ErrorKind::Timeout));

        let artifact = Artifact::new(Bytes::from_static(b"%PDF")).expect("non-empty");
        assert_eq!(CompilationResult::Success(artifact).outcome(), "succeeded");
    }
}
