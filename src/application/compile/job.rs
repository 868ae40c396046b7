use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU8, Ordering},
    },
    time::{Duration, Instant},
};

use tracing::{info, warn};
use uuid::Uuid;

use super::{
    accumulator,
    guard::TimeoutGuard,
    process::{self, ProcessHandle},
};
use crate::{
    config::EngineSettings,
    domain::{
        compilation::{Artifact, CompilationRequest, CompilationResult, ErrorKind},
        job::JobState,
    },
};

/// Job state plus the set-once result slot.
///
/// The state only moves along legal edges via compare-and-swap, and only the
/// caller that wins the move into a terminal state writes the result. Any
/// later settle attempt is rejected and leaves the stored result untouched.
#[derive(Debug, Default)]
pub struct JobCell {
    state: AtomicU8,
    result: OnceLock<CompilationResult>,
}

impl JobCell {
    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(JobState::Failed)
    }

    pub fn result(&self) -> Option<&CompilationResult> {
        self.result.get()
    }

    pub fn start(&self) -> bool {
        self.advance(JobState::Running)
    }

    /// Move into `next` and record `result`. Returns `false` if the job was
    /// already terminal or the edge is illegal; the result is then discarded.
    pub fn settle(&self, next: JobState, result: CompilationResult) -> bool {
        if !next.is_terminal() || !self.advance(next) {
            return false;
        }
        self.result.set(result).is_ok()
    }

    fn advance(&self, next: JobState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let Some(from) = JobState::from_u8(current) else {
                return false;
            };
            if !from.can_transition_to(next) {
                return false;
            }
            match self.state.compare_exchange(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// One end-to-end compile attempt: spawn, feed, collect, classify, exactly once.
pub struct CompilationJob {
    id: Uuid,
    settings: Arc<EngineSettings>,
    cell: Arc<JobCell>,
}

impl CompilationJob {
    pub fn new(settings: Arc<EngineSettings>) -> Self {
        Self {
            id: Uuid::new_v4(),
            settings,
            cell: Arc::new(JobCell::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Shared view of the job state, usable after `run` consumes the job.
    pub fn cell(&self) -> Arc<JobCell> {
        Arc::clone(&self.cell)
    }

    /// Run the engine once over `request`, racing it against `ceiling`.
    pub async fn run(self, request: &CompilationRequest, ceiling: Duration) -> CompilationResult {
        let started_at = Instant::now();

        let workdir = match ProcessHandle::scratch_dir() {
            Ok(dir) => dir,
            Err(err) => {
                return self.finish(
                    JobState::Failed,
                    CompilationResult::failure(ErrorKind::InternalError, err.to_string()),
                    started_at,
                );
            }
        };

        let mut process = match ProcessHandle::spawn(&self.settings, workdir, request.source()) {
            Ok(process) => process,
            Err(err) => {
                warn!(
                    target = "application::compile::job",
                    op = "job::spawn",
                    result = "error",
                    job_id = %self.id,
                    program = %self.settings.program.display(),
                    error = %err,
                    "Failed to spawn typesetting engine"
                );
                return self.finish(
                    JobState::Failed,
                    CompilationResult::failure(ErrorKind::EngineError, err.to_string()),
                    started_at,
                );
            }
        };
        self.cell.start();

        info!(
            target = "application::compile::job",
            op = "job::spawn",
            result = "running",
            job_id = %self.id,
            pid = process.id().unwrap_or_default(),
            source_bytes = request.len(),
            ceiling_ms = ceiling.as_millis() as u64,
            "Typesetting engine spawned"
        );

        let chunk_buffer = self.settings.chunk_buffer.get() as usize;
        let mut guard = TimeoutGuard::arm(ceiling);
        let completed = tokio::select! {
            result = drive(&mut process, chunk_buffer) => Some(result),
            () = guard.expired() => None,
        };

        let (state, result) = match completed {
            Some(result) => {
                guard.disarm();
                if let Err(err) = process.terminate().await {
                    warn!(
                        target = "application::compile::job",
                        op = "job::terminate",
                        result = "error",
                        job_id = %self.id,
                        error = %err,
                        "Failed to reap typesetting engine"
                    );
                }
                let state = if result.is_success() {
                    JobState::Succeeded
                } else {
                    JobState::Failed
                };
                (state, result)
            }
            None => {
                guard.enforce(&mut process).await;
                (
                    JobState::TimedOut,
                    CompilationResult::failure(
                        ErrorKind::Timeout,
                        format!("compilation exceeded the {ceiling:?} ceiling"),
                    ),
                )
            }
        };

        self.finish(state, result, started_at)
    }

    fn finish(
        &self,
        state: JobState,
        result: CompilationResult,
        started_at: Instant,
    ) -> CompilationResult {
        if !self.cell.settle(state, result.clone()) {
            warn!(
                target = "application::compile::job",
                op = "job::finish",
                result = "discarded",
                job_id = %self.id,
                state = %self.cell.state(),
                "Job already terminal; late outcome discarded"
            );
        }
        let settled = self.cell.result().cloned().unwrap_or(result);

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        match &settled {
            CompilationResult::Success(artifact) => info!(
                target = "application::compile::job",
                op = "job::finish",
                result = settled.outcome(),
                job_id = %self.id,
                elapsed_ms,
                artifact_bytes = artifact.len(),
                "Compilation succeeded"
            ),
            CompilationResult::Failure(failure) => warn!(
                target = "application::compile::job",
                op = "job::finish",
                result = settled.outcome(),
                job_id = %self.id,
                elapsed_ms,
                detail = %failure.message,
                "Compilation failed"
            ),
        }
        settled
    }
}

/// Wait for the engine, then pull its output through the accumulator.
async fn drive(process: &mut ProcessHandle, chunk_buffer: usize) -> CompilationResult {
    let status = match process.wait().await {
        Ok(status) => status,
        Err(err) => return CompilationResult::failure(ErrorKind::EngineError, err.to_string()),
    };

    if !status.success() {
        let diagnostic = process.diagnostic(status).await;
        return CompilationResult::failure(ErrorKind::EngineError, diagnostic);
    }

    let (sink, output) = accumulator::channel(chunk_buffer);
    let artifact_path = process.artifact_path();
    let (streamed, bytes) = tokio::join!(
        process::stream_file(&artifact_path, sink),
        output.collect()
    );
    if let Err(err) = streamed {
        return CompilationResult::failure(ErrorKind::InternalError, err.to_string());
    }

    match Artifact::new(bytes) {
        Some(artifact) => CompilationResult::Success(artifact),
        None => CompilationResult::failure(
            ErrorKind::EmptyArtifact,
            "engine exited cleanly but produced no output",
        ),
    }
}
