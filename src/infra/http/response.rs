use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::domain::compilation::Artifact;

const PDF_CONTENT_TYPE: &str = "application/pdf";
const PDF_DISPOSITION: &str = "inline; filename=document.pdf";

/// Frame a compiled artifact as an inline PDF download.
pub fn pdf_response(artifact: Artifact) -> Response {
    let length = HeaderValue::from(artifact.len());
    let mut response = (StatusCode::OK, Body::from(artifact.into_bytes())).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PDF_CONTENT_TYPE),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static(PDF_DISPOSITION),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONTENT_LENGTH, length);
    response
}
