//! HTTP surface: status report and the compile endpoint.

mod handlers;
mod middleware;
mod response;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use latexd_api_types::StatusReport;
use tower_http::cors::CorsLayer;

use crate::{application::compile::CompileService, config::EngineSettings};

pub use middleware::{REQUEST_ID_HEADER, RequestContext};
pub use response::pdf_response;

const STATUS_MESSAGE: &str = "LaTeX Compilation Service Running";

#[derive(Clone)]
pub struct HttpState {
    pub compiler: CompileService,
    pub report: Arc<StatusReport>,
}

impl HttpState {
    pub fn new(compiler: CompileService) -> Self {
        let report = Arc::new(status_report(compiler.settings()));
        Self { compiler, report }
    }
}

pub fn status_report(engine: &EngineSettings) -> StatusReport {
    StatusReport {
        status: STATUS_MESSAGE.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: engine.engine_name(),
        max_timeout: format!("{}s", engine.timeout.as_secs()),
    }
}

pub fn build_router(state: HttpState, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::status))
        .route("/compile", post(handlers::compile))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn(middleware::set_request_context))
}
