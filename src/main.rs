use std::{future::IntoFuture, path::Path, process, sync::Arc, time::Duration};

use latexd::{
    application::{compile::CompileService, error::AppError},
    config::{self, CompileArgs},
    domain::compilation::CompilationResult,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Compile(args) => run_compile(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let compiler = CompileService::new(Arc::new(settings.engine.clone()));
    let state = HttpState::new(compiler.clone());
    let body_limit = usize::try_from(settings.http.max_request_bytes.get()).map_err(|_| {
        AppError::from(InfraError::configuration(
            "http.max_request_bytes does not fit in memory on this platform",
        ))
    })?;
    let router = http::build_router(state, body_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "latexd::serve",
        addr = %settings.server.addr,
        engine = %settings.engine.program.display(),
        timeout_secs = settings.engine.timeout.as_secs(),
        max_concurrent_jobs = settings.engine.max_concurrent_jobs.get(),
        "LaTeX compilation service listening"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(true);
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    let result = tokio::select! {
        result = server => result
            .map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        () = grace_period_elapsed(stop_rx, grace) => {
            warn!(
                target = "latexd::serve",
                grace_secs = grace.as_secs(),
                "In-flight requests still running after the grace period; exiting"
            );
            Ok(())
        }
    };

    compiler.close();
    info!(target = "latexd::serve", "LaTeX compilation service stopped");
    result
}

async fn run_compile(settings: config::Settings, args: CompileArgs) -> Result<(), AppError> {
    let source = tokio::fs::read_to_string(&args.input)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));

    let compiler = CompileService::new(Arc::new(settings.engine));
    match compiler.compile(source).await {
        CompilationResult::Success(artifact) => {
            let bytes = artifact.len();
            tokio::fs::write(&output, artifact.into_bytes())
                .await
                .map_err(|err| AppError::from(InfraError::from(err)))?;
            info!(
                target = "latexd::compile",
                input = %args.input.display(),
                output = %output.display(),
                bytes,
                "PDF written"
            );
            Ok(())
        }
        CompilationResult::Failure(failure) => Err(failure.into()),
    }
}

fn default_output_path(input: &Path) -> std::path::PathBuf {
    input.with_extension("pdf")
}

async fn grace_period_elapsed(mut stop: watch::Receiver<bool>, grace: Duration) {
    if stop.wait_for(|stopping| *stopping).await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "latexd::serve", error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target = "latexd::serve", error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!(target = "latexd::serve", "Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            info!(
                target = "latexd::serve",
                "Received terminate signal, initiating graceful shutdown"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_swaps_the_extension() {
        assert_eq!(
            default_output_path(Path::new("/tmp/report.tex")),
            Path::new("/tmp/report.pdf")
        );
        assert_eq!(
            default_output_path(Path::new("notes")),
            Path::new("notes.pdf")
        );
    }
}
