//! Maps compilation failures onto the public error taxonomy.
//!
//! Pure and deterministic: the engine diagnostic is passed through as
//! `details` without being inspected.

use axum::http::StatusCode;
use latexd_api_types::ErrorBody;

use crate::domain::compilation::{CompilationFailure, ErrorKind};

const ENGINE_HINT: &str = "Check for missing packages or syntax errors";
const EMPTY_ARTIFACT_HINT: &str = "Check LaTeX syntax and package availability";
const TIMEOUT_HINT: &str = "Document too complex or server overloaded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    ClientError,
    ServerError,
    GatewayTimeout,
}

impl StatusClass {
    pub fn status_code(self) -> StatusCode {
        match self {
            StatusClass::ClientError => StatusCode::BAD_REQUEST,
            StatusClass::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            StatusClass::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

pub fn classify_failure(failure: &CompilationFailure) -> (StatusClass, ErrorBody) {
    let (status, error, details, default_hint) = match failure.kind {
        ErrorKind::InvalidInput => (StatusClass::ClientError, "No content provided", None, None),
        ErrorKind::EngineError => (
            StatusClass::ServerError,
            "LaTeX compilation failed",
            Some(failure.message.clone()),
            Some(ENGINE_HINT),
        ),
        ErrorKind::EmptyArtifact => (
            StatusClass::ServerError,
            "Generated empty PDF",
            None,
            Some(EMPTY_ARTIFACT_HINT),
        ),
        ErrorKind::Timeout => (
            StatusClass::GatewayTimeout,
            "Compilation timeout",
            None,
            Some(TIMEOUT_HINT),
        ),
        ErrorKind::InternalError => (
            StatusClass::ServerError,
            "Internal server error",
            Some(failure.message.clone()),
            None,
        ),
    };

    let hint = failure
        .hint
        .clone()
        .or_else(|| default_hint.map(str::to_string));

    (
        status,
        ErrorBody {
            error: error.to_string(),
            details,
            hint,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes_follow_the_taxonomy() {
        let cases = [
            (ErrorKind::InvalidInput, StatusCode::BAD_REQUEST),
            (ErrorKind::EngineError, StatusCode::INTERNAL_SERVER_ERROR),
            (ErrorKind::EmptyArtifact, StatusCode::INTERNAL_SERVER_ERROR),
            (ErrorKind::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (ErrorKind::InternalError, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (kind, expected) in cases {
            let (class, _) = classify_failure(&CompilationFailure::new(kind, "message"));
            assert_eq!(class.status_code(), expected, "{kind}");
        }
    }

    #[test]
    fn engine_diagnostic_is_passed_through_verbatim() {
        let diagnostic = "! LaTeX Error: File `nope.cls' not found.\n! Emergency stop.";
        let (_, body) = classify_failure(&CompilationFailure::new(
            ErrorKind::EngineError,
            diagnostic,
        ));
        assert_eq!(body.error, "LaTeX compilation failed");
        assert_eq!(body.details.as_deref(), Some(diagnostic));
        assert_eq!(body.hint.as_deref(), Some(ENGINE_HINT));
    }

    #[test]
    fn failure_hint_overrides_default() {
        let failure = CompilationFailure::new(ErrorKind::Timeout, "slow")
            .with_hint("Try splitting the document");
        let (_, body) = classify_failure(&failure);
        assert_eq!(body.hint.as_deref(), Some("Try splitting the document"));
    }

    #[test]
    fn timeout_body_is_stable() {
        let (_, body) = classify_failure(&CompilationFailure::new(
            ErrorKind::Timeout,
            "compilation exceeded the 90s ceiling",
        ));
        let json = serde_json::to_string(&body).expect("serialize");
        insta::assert_snapshot!(json, @r#"{"error":"Compilation timeout","hint":"Document too complex or server overloaded"}"#);
    }

    #[test]
    fn classification_is_deterministic() {
        let failure = CompilationFailure::new(ErrorKind::EmptyArtifact, "no output");
        assert_eq!(classify_failure(&failure), classify_failure(&failure));
    }
}
