use std::{
    io::{self, ErrorKind as IoErrorKind},
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use bytes::BytesMut;
use tempfile::TempDir;
use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStdin, Command},
    task::JoinHandle,
};
use tracing::debug;

use super::accumulator::ChunkSink;
use crate::config::EngineSettings;

/// Job name passed to the engine; output lands in `texput.pdf` and `texput.log`.
pub(crate) const JOB_NAME: &str = "texput";
const TRANSCRIPT_LIMIT_BYTES: usize = 64 * 1024;
const ARTIFACT_CHUNK_BYTES: usize = 64 * 1024;
/// How long a pipe may stay open after the engine itself has exited.
const TRANSCRIPT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to prepare engine scratch directory: {0}")]
    Workspace(io::Error),
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait for engine exit: {0}")]
    Wait(io::Error),
    #[error("failed to terminate engine: {0}")]
    Kill(io::Error),
    #[error("failed to read engine output: {0}")]
    Output(io::Error),
}

/// One running engine invocation inside its own scratch directory.
///
/// The engine leads its own process group, so helpers it forks go down with
/// it. The handle owns the child and the tasks pumping its pipes. Dropping it
/// kills the group and removes the scratch directory; [`ProcessHandle::terminate`]
/// does the same eagerly and reaps the process.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    workdir: TempDir,
    feeder: Option<JoinHandle<()>>,
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
}

impl ProcessHandle {
    pub fn scratch_dir() -> Result<TempDir, ProcessError> {
        tempfile::Builder::new()
            .prefix("latexd-")
            .tempdir()
            .map_err(ProcessError::Workspace)
    }

    /// Spawn the engine for a single pass and start streaming `source` into stdin.
    pub fn spawn(
        settings: &EngineSettings,
        workdir: TempDir,
        source: &str,
    ) -> Result<Self, ProcessError> {
        let mut command = Command::new(&settings.program);
        command
            .arg("-halt-on-error")
            .arg(format!("-jobname={JOB_NAME}"))
            .current_dir(workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        if let Some(texinputs) = settings.texinputs.as_deref() {
            // Trailing separator keeps the engine's built-in search path.
            command.env("TEXINPUTS", format!("{texinputs}:"));
        }

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: settings.program.display().to_string(),
            source,
        })?;
        let pid = child.id();

        let feeder = child.stdin.take().map(|stdin| {
            let source = source.to_owned();
            tokio::spawn(async move {
                if let Err(err) = feed_source(stdin, source).await {
                    debug!(
                        target = "application::compile::process",
                        op = "process::feed_source",
                        pid = pid.unwrap_or_default(),
                        error = %err,
                        "Engine stopped reading stdin before the source was fully written"
                    );
                }
            })
        });
        let stdout = child.stdout.take().map(|out| tokio::spawn(drain_tail(out)));
        let stderr = child.stderr.take().map(|err| tokio::spawn(drain_tail(err)));

        Ok(Self {
            child,
            pid,
            workdir,
            feeder,
            stdout,
            stderr,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.workdir().join(format!("{JOB_NAME}.pdf"))
    }

    pub fn log_path(&self) -> PathBuf {
        self.workdir().join(format!("{JOB_NAME}.log"))
    }

    /// Wait for the engine to exit. Cancel-safe.
    pub async fn wait(&mut self) -> Result<ExitStatus, ProcessError> {
        self.child.wait().await.map_err(ProcessError::Wait)
    }

    /// The engine's own account of why it failed.
    ///
    /// Anything the engine left running is killed first so its pipes close.
    pub async fn diagnostic(&mut self, status: ExitStatus) -> String {
        if let Err(err) = kill_group(self.pid) {
            debug!(
                target = "application::compile::process",
                op = "process::diagnostic",
                pid = self.pid.unwrap_or_default(),
                error = %err,
                "Failed to signal the engine's process group"
            );
        }
        let log = tokio::fs::read(self.log_path())
            .await
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        let transcript = self.transcript().await;
        engine_diagnostic(log.as_deref(), &transcript, status)
    }

    /// Kill the engine's process group if anything in it is still running and
    /// reap the engine.
    ///
    /// Returns `true` when the engine itself still had to be killed.
    pub async fn terminate(&mut self) -> Result<bool, ProcessError> {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        for task in [self.stdout.take(), self.stderr.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }

        let running = !matches!(self.child.try_wait(), Ok(Some(_)));
        kill_group(self.pid).map_err(ProcessError::Kill)?;
        if running {
            self.child.kill().await.map_err(ProcessError::Kill)?;
        }
        Ok(running)
    }

    async fn transcript(&mut self) -> String {
        let mut captured = Vec::new();
        for mut task in [self.stdout.take(), self.stderr.take()]
            .into_iter()
            .flatten()
        {
            match tokio::time::timeout(TRANSCRIPT_GRACE, &mut task).await {
                Ok(Ok(bytes)) => captured.extend_from_slice(&bytes),
                Ok(Err(_)) => {}
                Err(_elapsed) => {
                    task.abort();
                    debug!(
                        target = "application::compile::process",
                        op = "process::transcript",
                        pid = self.pid.unwrap_or_default(),
                        grace_ms = TRANSCRIPT_GRACE.as_millis() as u64,
                        "Engine pipe still open after exit; transcript truncated"
                    );
                }
            }
        }
        String::from_utf8_lossy(&captured).into_owned()
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        let _ = kill_group(self.pid);
    }
}

/// SIGKILL every process in the group led by `pid`. An empty group is fine.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) -> io::Result<()> {
    use nix::{
        errno::Errno,
        sys::signal::{Signal, killpg},
        unistd::Pid,
    };

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return Ok(());
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) -> io::Result<()> {
    Ok(())
}

async fn feed_source(mut stdin: ChildStdin, source: String) -> io::Result<()> {
    stdin.write_all(source.as_bytes()).await?;
    stdin.shutdown().await
}

/// Read a pipe to the end, keeping only the last [`TRANSCRIPT_LIMIT_BYTES`].
async fn drain_tail<R>(mut reader: R) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut tail = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(read) => {
                tail.extend_from_slice(&buf[..read]);
                if tail.len() > TRANSCRIPT_LIMIT_BYTES {
                    let excess = tail.len() - TRANSCRIPT_LIMIT_BYTES;
                    tail.drain(..excess);
                }
            }
        }
    }
    tail
}

/// Stream a finished artifact file into the accumulator in fixed-size chunks.
///
/// A missing file is reported as zero bytes. Stops early if the receiver is gone.
pub(crate) async fn stream_file(path: &Path, sink: ChunkSink) -> Result<u64, ProcessError> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(ProcessError::Output(err)),
    };

    let mut sent = 0u64;
    loop {
        let mut buf = BytesMut::with_capacity(ARTIFACT_CHUNK_BYTES);
        let read = file
            .read_buf(&mut buf)
            .await
            .map_err(ProcessError::Output)?;
        if read == 0 {
            break;
        }
        sent += read as u64;
        if sink.send(buf.freeze()).await.is_err() {
            break;
        }
    }
    Ok(sent)
}

/// Pick the engine diagnostic: `!` lines from the job log, then from the
/// console transcript, then the bare exit status.
pub(crate) fn engine_diagnostic(log: Option<&str>, transcript: &str, status: ExitStatus) -> String {
    let from_log = log.map(error_lines).unwrap_or_default();
    if !from_log.is_empty() {
        return from_log;
    }
    let from_transcript = error_lines(transcript);
    if !from_transcript.is_empty() {
        return from_transcript;
    }
    format!("engine exited with {status}")
}

fn error_lines(text: &str) -> String {
    text.lines()
        .filter(|line| line.starts_with('!'))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::application::compile::accumulator;
    use std::os::unix::process::ExitStatusExt;

    fn exit_code(code: i32) -> ExitStatus {
        ExitStatus::from_raw(code << 8)
    }

    #[test]
    fn diagnostic_prefers_log_error_lines() {
        let log = "This is pdfTeX\n\
                   ! LaTeX Error: File `nope.cls' not found.\n\
                   l.1 \\documentclass{nope}\n";
        let transcript = "! Emergency stop.\n";
        assert_eq!(
            engine_diagnostic(Some(log), transcript, exit_code(1)),
            "! LaTeX Error: File `nope.cls' not found."
        );
    }

    #[test]
    fn diagnostic_falls_back_to_transcript_then_status() {
        assert_eq!(
            engine_diagnostic(
                Some("no errors here"),
                "! Undefined control sequence.\n! Emergency stop.",
                exit_code(1)
            ),
            "! Undefined control sequence.\n! Emergency stop."
        );
        assert_eq!(
            engine_diagnostic(None, "quiet", exit_code(3)),
            "engine exited with exit status: 3"
        );
    }

    #[tokio::test]
    async fn drain_keeps_only_the_tail() {
        let input = vec![b'x'; TRANSCRIPT_LIMIT_BYTES + 10];
        let tail = drain_tail(&input[..]).await;
        assert_eq!(tail.len(), TRANSCRIPT_LIMIT_BYTES);
    }

    #[tokio::test]
    async fn missing_artifact_streams_nothing() {
        let dir = TempDir::new().expect("temp dir");
        let (sink, accumulator) = accumulator::channel(1);
        let sent = stream_file(&dir.path().join("texput.pdf"), sink)
            .await
            .expect("missing file is not an error");
        assert_eq!(sent, 0);
        assert!(accumulator.collect().await.is_empty());
    }

    #[tokio::test]
    async fn artifact_is_streamed_in_chunks() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("texput.pdf");
        let payload = vec![7u8; ARTIFACT_CHUNK_BYTES * 2 + 5];
        std::fs::write(&path, &payload).expect("write artifact");

        let (sink, accumulator) = accumulator::channel(1);
        let (sent, bytes) = tokio::join!(stream_file(&path, sink), accumulator.collect());
        assert_eq!(sent.expect("stream ok"), payload.len() as u64);
        assert_eq!(&bytes[..], &payload[..]);
    }
}
