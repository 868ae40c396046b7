use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::{counter, gauge, histogram};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::job::CompilationJob;
use crate::{
    config::EngineSettings,
    domain::compilation::{CompilationFailure, CompilationRequest, CompilationResult, ErrorKind},
};

pub(crate) const METRIC_COMPILE_TOTAL: &str = "latexd_compile_total";
pub(crate) const METRIC_COMPILE_MS: &str = "latexd_compile_ms";
pub(crate) const METRIC_COMPILE_IN_FLIGHT: &str = "latexd_compile_in_flight";
pub(crate) const METRIC_ARTIFACT_BYTES: &str = "latexd_artifact_bytes";

const SATURATED_HINT: &str = "All compilation slots are busy; retry shortly";

/// Entry point for `Compile(source) -> CompilationResult`.
///
/// Validates the source, waits for a free engine slot and runs one
/// [`CompilationJob`]. Time spent waiting for a slot counts against the
/// ceiling, so a saturated service answers `Timeout` instead of queueing
/// forever.
#[derive(Clone)]
pub struct CompileService {
    settings: Arc<EngineSettings>,
    permits: Arc<Semaphore>,
}

impl CompileService {
    pub fn new(settings: Arc<EngineSettings>) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_jobs.get() as usize));
        Self { settings, permits }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn ceiling(&self) -> Duration {
        self.settings.timeout
    }

    pub async fn compile(&self, source: impl Into<String>) -> CompilationResult {
        let outcome = OutcomeRecorder::start();
        let result = self.compile_inner(source.into(), outcome.started_at).await;
        outcome.record(&result);
        result
    }

    async fn compile_inner(&self, source: String, started_at: Instant) -> CompilationResult {
        let request = match CompilationRequest::new(source) {
            Ok(request) => request,
            Err(err) => return CompilationResult::Failure(err.into()),
        };

        let ceiling = self.ceiling();
        let permit =
            match tokio::time::timeout(ceiling, Arc::clone(&self.permits).acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_closed)) => {
                    return CompilationResult::failure(
                        ErrorKind::InternalError,
                        "compile service is shutting down",
                    );
                }
                Err(_elapsed) => {
                    warn!(
                        target = "application::compile::service",
                        op = "compile::acquire",
                        result = "timeout",
                        ceiling_ms = ceiling.as_millis() as u64,
                        max_concurrent_jobs = self.settings.max_concurrent_jobs.get(),
                        "No engine slot became free before the ceiling"
                    );
                    return saturated(ceiling);
                }
            };

        let budget = ceiling.saturating_sub(started_at.elapsed());
        if budget.is_zero() {
            return saturated(ceiling);
        }

        let job = CompilationJob::new(Arc::clone(&self.settings));
        info!(
            target = "application::compile::service",
            op = "compile::start",
            result = "accepted",
            job_id = %job.id(),
            source_bytes = request.len(),
            budget_ms = budget.as_millis() as u64,
            "Compilation job started"
        );

        let in_flight = InFlight::enter();
        let result = job.run(&request, budget).await;
        drop(in_flight);
        drop(permit);

        result
    }

    /// Stop handing out engine slots; waiting requests fail immediately.
    pub fn close(&self) {
        self.permits.close();
    }
}

fn saturated(ceiling: Duration) -> CompilationResult {
    CompilationResult::Failure(
        CompilationFailure::new(
            ErrorKind::Timeout,
            format!("no engine slot became free within {ceiling:?}"),
        )
        .with_hint(SATURATED_HINT),
    )
}

/// One unit of the in-flight gauge, released on drop.
///
/// A request future dropped mid-compile (client gone, server shutting down)
/// still gives its unit back.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        gauge!(METRIC_COMPILE_IN_FLIGHT).increment(1.0);
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!(METRIC_COMPILE_IN_FLIGHT).decrement(1.0);
    }
}

/// Records the outcome counter and latency exactly once per `compile` call.
///
/// Dropped without [`OutcomeRecorder::record`], the call counts as `cancelled`.
struct OutcomeRecorder {
    started_at: Instant,
    recorded: bool,
}

impl OutcomeRecorder {
    fn start() -> Self {
        Self {
            started_at: Instant::now(),
            recorded: false,
        }
    }

    fn record(mut self, result: &CompilationResult) {
        self.emit(result.outcome());
        if let CompilationResult::Success(artifact) = result {
            histogram!(METRIC_ARTIFACT_BYTES).record(artifact.len() as f64);
        }
    }

    fn emit(&mut self, outcome: &'static str) {
        self.recorded = true;
        counter!(METRIC_COMPILE_TOTAL, "outcome" => outcome).increment(1);
        histogram!(METRIC_COMPILE_MS).record(self.started_at.elapsed().as_secs_f64() * 1000.0);
    }
}

impl Drop for OutcomeRecorder {
    fn drop(&mut self) {
        if !self.recorded {
            warn!(
                target = "application::compile::service",
                op = "compile::cancel",
                result = "cancelled",
                elapsed_ms = self.started_at.elapsed().as_millis() as u64,
                "Compilation request dropped before it finished"
            );
            self.emit("cancelled");
        }
    }
}
