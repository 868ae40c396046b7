//! Wire types for the latexd compilation API.
//!
//! The server and any client share these definitions so the JSON shapes stay
//! in one place.

use serde::{Deserialize, Serialize};

/// Body of `POST /compile`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompileRequest {
    /// LaTeX source text. A missing field is treated the same as blank input.
    #[serde(default)]
    pub content: Option<String>,
}

impl CompileRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }
}

/// JSON body returned for every failed compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Static report served from `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: String,
    pub version: String,
    pub engine: String,
    #[serde(rename = "maxTimeout")]
    pub max_timeout: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_content_deserializes_to_none() {
        let request: CompileRequest = serde_json::from_str("{}").expect("valid json");
        assert!(request.content.is_none());
    }

    #[test]
    fn error_body_omits_absent_fields() {
        let body = ErrorBody {
            error: "No content provided".to_string(),
            details: None,
            hint: None,
        };
        let json = serde_json::to_string(&body).expect("serialize");
        assert_eq!(json, r#"{"error":"No content provided"}"#);
    }

    #[test]
    fn status_report_uses_camel_case_timeout_key() {
        let report = StatusReport {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            engine: "pdflatex".to_string(),
            max_timeout: "90s".to_string(),
        };
        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["maxTimeout"], "90s");
    }
}
