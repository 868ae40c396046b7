use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::compile::classify_failure,
    domain::{
        compilation::{CompilationFailure, ErrorKind},
        error::DomainError,
    },
    infra::error::InfraError,
};

/// Diagnostic chain attached to failed responses and logged by the response middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("compilation failed: {0}")]
    Compilation(#[from] CompilationFailure),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Collapse into the public failure taxonomy.
    pub fn to_failure(&self) -> CompilationFailure {
        match self {
            AppError::Compilation(failure) => failure.clone(),
            AppError::Domain(err) => err.clone().into(),
            AppError::Infra(err) => {
                CompilationFailure::new(ErrorKind::InternalError, err.to_string())
            }
            AppError::Unexpected(message) => {
                CompilationFailure::new(ErrorKind::InternalError, message.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let failure = self.to_failure();
        let (class, body) = classify_failure(&failure);
        let status = class.status_code();
        let mut response = (status, Json(body)).into_response();
        ErrorReport::from_error("application::error", status, &self).attach(&mut response);
        response
    }
}
