//! End-to-end coverage against a real `pdflatex` on `PATH`.
//!
//! Marked `#[ignore]`; run with `cargo test -- --ignored` on a host with a TeX
//! distribution installed.

use std::{sync::Arc, time::Duration};

use latexd::{
    application::compile::CompileService,
    config::EngineSettings,
    domain::compilation::{CompilationResult, ErrorKind},
};

fn service() -> CompileService {
    CompileService::new(Arc::new(EngineSettings {
        timeout: Duration::from_secs(60),
        ..Default::default()
    }))
}

#[tokio::test]
#[ignore]
async fn minimal_article_compiles_to_pdf() {
    let result = service()
        .compile("\\documentclass{article}\\begin{document}Hello\\end{document}")
        .await;

    match result {
        CompilationResult::Success(artifact) => {
            assert!(artifact.as_bytes().starts_with(b"%PDF"));
        }
        other => panic!("expected a PDF, got {other:?}"),
    }
}

#[tokio::test]
#[ignore]
async fn unknown_document_class_reports_engine_error() {
    let result = service()
        .compile("\\documentclass{latexd-no-such-class}\\begin{document}x\\end{document}")
        .await;

    match result {
        CompilationResult::Failure(failure) => {
            assert_eq!(failure.kind, ErrorKind::EngineError);
            assert!(failure.message.contains("latexd-no-such-class"));
        }
        other => panic!("expected an engine error, got {other:?}"),
    }
}
