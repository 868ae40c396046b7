use std::{pin::Pin, time::Duration};

use tokio::time::{Instant, Sleep, sleep_until};
use tracing::warn;

use super::process::ProcessHandle;

/// Wall-clock ceiling for one job.
///
/// The guard is armed when the job starts and raced against it. When it wins,
/// [`TimeoutGuard::enforce`] kills the engine; when the job wins,
/// [`TimeoutGuard::disarm`] drops the timer without touching the process.
#[derive(Debug)]
pub struct TimeoutGuard {
    ceiling: Duration,
    armed_at: Instant,
    timer: Pin<Box<Sleep>>,
}

impl TimeoutGuard {
    pub fn arm(ceiling: Duration) -> Self {
        let armed_at = Instant::now();
        Self {
            ceiling,
            armed_at,
            timer: Box::pin(sleep_until(armed_at + ceiling)),
        }
    }

    /// Resolves once the deadline passes. Cancel-safe.
    pub async fn expired(&mut self) {
        self.timer.as_mut().await;
    }

    /// Force-terminate the engine after expiry.
    pub async fn enforce(self, process: &mut ProcessHandle) {
        let pid = process.id().unwrap_or_default();
        let ceiling_ms = self.ceiling.as_millis() as u64;
        match process.terminate().await {
            Ok(_) => warn!(
                target = "application::compile::guard",
                op = "guard::enforce",
                result = "killed",
                pid,
                ceiling_ms,
                "Engine exceeded the ceiling and was killed"
            ),
            Err(err) => warn!(
                target = "application::compile::guard",
                op = "guard::enforce",
                result = "kill_failed",
                pid,
                ceiling_ms,
                error = %err,
                "Failed to kill engine after timeout"
            ),
        }
    }

    /// Stop the timer; returns how long the guarded work took.
    pub fn disarm(self) -> Duration {
        self.armed_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_at_the_ceiling() {
        let mut guard = TimeoutGuard::arm(Duration::from_secs(90));
        let started = Instant::now();
        guard.expired().await;
        assert_eq!(started.elapsed(), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn loses_to_faster_work() {
        let mut guard = TimeoutGuard::arm(Duration::from_secs(5));
        let winner = tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(1)) => "job",
            () = guard.expired() => "guard",
        };
        assert_eq!(winner, "job");
        assert_eq!(guard.disarm(), Duration::from_secs(1));
    }
}
