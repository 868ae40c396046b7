use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::Response,
};
use latexd_api_types::{CompileRequest, StatusReport};

use super::{HttpState, response::pdf_response};
use crate::{
    application::error::AppError,
    domain::compilation::{CompilationFailure, CompilationResult, ErrorKind},
};

pub(super) async fn status(State(state): State<HttpState>) -> Json<StatusReport> {
    Json(state.report.as_ref().clone())
}

pub(super) async fn compile(
    State(state): State<HttpState>,
    payload: Result<Json<CompileRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = match payload {
        Ok(Json(request)) => request,
        // Without a JSON content type the body is not parsed at all.
        Err(JsonRejection::MissingJsonContentType(_)) => CompileRequest::default(),
        Err(rejection) => {
            return Err(
                CompilationFailure::new(ErrorKind::InternalError, rejection.body_text()).into(),
            );
        }
    };

    match state
        .compiler
        .compile(request.content.unwrap_or_default())
        .await
    {
        CompilationResult::Success(artifact) => Ok(pdf_response(artifact)),
        CompilationResult::Failure(failure) => Err(failure.into()),
    }
}
