//! Shared fixtures for integration tests: a `/bin/sh` stand-in for pdflatex.
#![allow(dead_code)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use latexd::config::EngineSettings;
use tempfile::TempDir;

/// Writes `%PDF-1.5 fake` as the artifact after consuming the source.
pub const SUCCEEDING_ENGINE: &str = "cat > /dev/null\nprintf '%%PDF-1.5 fake' > texput.pdf\n";
/// Logs a missing document class and exits non-zero.
pub const FAILING_ENGINE: &str = "cat > /dev/null\n\
printf '! LaTeX Error: File `nope.cls'\"'\"' not found.\\n' > texput.log\n\
exit 1\n";
/// Exits cleanly without producing anything.
pub const SILENT_ENGINE: &str = "cat > /dev/null\nexit 0\n";
/// Never finishes on its own.
pub const HANGING_ENGINE: &str = "exec sleep 30\n";

pub const ENGINE_DIAGNOSTIC: &str = "! LaTeX Error: File `nope.cls' not found.";

pub struct FakeEngine {
    dir: TempDir,
    program: PathBuf,
}

impl FakeEngine {
    pub fn new(body: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let program = dir.path().join("fake-pdflatex");
        fs::write(&program, format!("#!/bin/sh\n{body}")).expect("write script");
        make_executable(&program);
        Self { dir, program }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn settings(&self, timeout: Duration) -> Arc<EngineSettings> {
        Arc::new(EngineSettings {
            program: self.program.clone(),
            timeout,
            ..Default::default()
        })
    }
}

fn make_executable(path: &Path) {
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("set perms");
}

/// Whether `pid` has exited; an unreaped zombie counts as gone.
pub fn process_is_gone(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state == "Z" || state == "X"),
        Err(_) => true,
    }
}

/// Poll until `pid` is gone or `within` passes.
pub async fn wait_until_gone(pid: u32, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if process_is_gone(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    process_is_gone(pid)
}

/// Read a pid the engine script wrote, waiting for the file to appear.
pub async fn read_pid(path: &Path, within: Duration) -> u32 {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if let Ok(text) = fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "engine never wrote {}",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
