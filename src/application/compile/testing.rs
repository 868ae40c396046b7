//! Shell-script stand-ins for the typesetting engine.

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tempfile::TempDir;

use crate::config::EngineSettings;

/// A `/bin/sh` script installed as the engine program.
///
/// The script runs inside the job's scratch directory, so relative paths such
/// as `texput.pdf` land where the job looks for them. Absolute paths under
/// [`FakeEngine::path`] survive the job and can be inspected afterwards.
pub(crate) struct FakeEngine {
    dir: TempDir,
    program: PathBuf,
}

impl FakeEngine {
    pub(crate) fn new(body: impl FnOnce(&Path) -> String) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let program = dir.path().join("fake-pdflatex");
        let script = format!("#!/bin/sh\n{}", body(dir.path()));
        fs::write(&program, script).expect("write script");
        make_executable(&program);
        Self { dir, program }
    }

    pub(crate) fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub(crate) fn settings(&self, timeout: Duration) -> Arc<EngineSettings> {
        Arc::new(EngineSettings {
            program: self.program.clone(),
            timeout,
            ..Default::default()
        })
    }
}

/// Whether `pid` has exited; an unreaped zombie counts as gone.
pub(crate) fn process_is_gone(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state == "Z" || state == "X"),
        Err(_) => true,
    }
}

/// Poll until `pid` is gone or `within` passes.
pub(crate) async fn wait_until_gone(pid: u32, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if process_is_gone(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    process_is_gone(pid)
}

pub(crate) fn read_pid(path: &Path) -> u32 {
    fs::read_to_string(path)
        .expect("pid recorded")
        .trim()
        .parse()
        .expect("pid is a number")
}

fn make_executable(path: &Path) {
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("set perms");
}
