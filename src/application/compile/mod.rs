//! Compilation core: one engine run per request, raced against its ceiling.

pub mod accumulator;
pub mod classifier;
pub mod guard;
pub mod job;
pub mod process;
mod service;

#[cfg(all(test, unix))]
pub(crate) mod testing;

pub use accumulator::{ChunkSink, OutputAccumulator};
pub use classifier::{StatusClass, classify_failure};
pub use guard::TimeoutGuard;
pub use job::{CompilationJob, JobCell};
pub use process::{ProcessError, ProcessHandle};
pub use service::CompileService;
