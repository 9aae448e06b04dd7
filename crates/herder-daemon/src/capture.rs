//! Background capture of a child's stdout/stderr
//!
//! One [`CaptureWorker`] runs per spawned process. It exclusively owns the
//! `Child` and its pipes: tokio's child pipes are non-blocking and driven by
//! the runtime's readiness notifications, so the worker sleeps until a pipe
//! has data or hits end-of-stream. Once every captured pipe has closed, it
//! waits for the process to exit and records the status as the buffer's
//! final Closed event.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::task::JoinHandle;

use herder_core::prelude::*;
use herder_core::{ExitStatus, OutputKind};

use crate::buffer::OutputBuffer;

/// Bytes read per readiness wakeup
const READ_CHUNK: usize = 8 * 1024;

pub(crate) struct CaptureWorker {
    pub(crate) name: String,
    pub(crate) child: Child,
    pub(crate) stdout: Option<ChildStdout>,
    pub(crate) stderr: Option<ChildStderr>,
    pub(crate) output: Arc<OutputBuffer>,
    pub(crate) running: Arc<AtomicBool>,
}

impl CaptureWorker {
    pub(crate) fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut stdout = self.stdout.take();
        let mut stderr = self.stderr.take();
        let mut out_buf = vec![0u8; READ_CHUNK];
        let mut err_buf = vec![0u8; READ_CHUNK];

        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                result = read_some(&mut stdout, &mut out_buf), if stdout.is_some() => {
                    if !self.record(OutputKind::Stdout, result, &out_buf) {
                        stdout = None;
                    }
                }
                result = read_some(&mut stderr, &mut err_buf), if stderr.is_some() => {
                    if !self.record(OutputKind::Stderr, result, &err_buf) {
                        stderr = None;
                    }
                }
            }
        }

        let status = match self.child.wait().await {
            Ok(status) => {
                info!("Process {} exited with status: {:?}", self.name, status);
                exit_status(status)
            }
            Err(e) => {
                error!("Error waiting for process {}: {}", self.name, e);
                ExitStatus::Unknown
            }
        };

        // Closed goes in before the flag flips, so a reader that sees
        // `running == false` always finds the exit status buffered.
        self.output.close(status);
        self.running.store(false, Ordering::Release);
        debug!("Capture worker for {} finished", self.name);
    }

    /// Store one read result. Returns whether the pipe should stay in the wait set.
    fn record(&self, kind: OutputKind, result: io::Result<usize>, buf: &[u8]) -> bool {
        match result {
            Ok(0) => {
                debug!("{}: {} reached end of stream", self.name, kind.tag());
                false
            }
            Ok(n) => {
                trace!("{}: {} bytes on {}", self.name, n, kind.tag());
                self.output.append(kind, &buf[..n]);
                true
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => true,
            Err(e) => {
                warn!("{}: error reading {}: {}", self.name, kind.tag(), e);
                false
            }
        }
    }
}

/// Read whatever is available on `pipe`; never resolves for a closed pipe.
async fn read_some<R: AsyncRead + Unpin>(pipe: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize> {
    match pipe {
        Some(pipe) => pipe.read(buf).await,
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
fn exit_status(status: std::process::ExitStatus) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => ExitStatus::Code(code),
        (None, Some(signal)) => ExitStatus::Signal(signal),
        (None, None) => ExitStatus::Unknown,
    }
}

#[cfg(not(unix))]
fn exit_status(status: std::process::ExitStatus) -> ExitStatus {
    status.code().map_or(ExitStatus::Unknown, ExitStatus::Code)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::Command;

    fn worker_for(script: &str, capacity: usize) -> (CaptureWorker, Arc<OutputBuffer>, Arc<AtomicBool>) {
        let mut child = Command::new("/bin/sh")
            .args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("sh must be available in test environment");

        let output = Arc::new(OutputBuffer::new(capacity));
        let running = Arc::new(AtomicBool::new(true));
        let worker = CaptureWorker {
            name: "test".to_string(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
            output: Arc::clone(&output),
            running: Arc::clone(&running),
        };
        (worker, output, running)
    }

    #[tokio::test]
    async fn test_closed_is_recorded_once_after_output() {
        let (worker, output, running) = worker_for("printf hello; exit 7", 1024);
        tokio::time::timeout(Duration::from_secs(5), worker.start())
            .await
            .expect("worker should finish")
            .unwrap();

        assert!(!running.load(Ordering::Acquire));
        let snap = output.retrieve().unwrap();
        let closed: Vec<_> = snap.events.iter().filter(|e| e.is_closed()).collect();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_status(), Some(ExitStatus::Code(7)));
        assert!(snap.events.last().unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_signal_death_is_reported() {
        let (worker, output, _running) = worker_for("kill -9 $$", 1024);
        tokio::time::timeout(Duration::from_secs(5), worker.start())
            .await
            .expect("worker should finish")
            .unwrap();

        let snap = output.retrieve().unwrap();
        assert_eq!(
            snap.events.last().unwrap().exit_status(),
            Some(ExitStatus::Signal(9))
        );
    }

    #[tokio::test]
    async fn test_large_output_stays_bounded() {
        let (worker, output, _running) = worker_for("head -c 100000 /dev/zero", 10);
        tokio::time::timeout(Duration::from_secs(5), worker.start())
            .await
            .expect("worker should finish")
            .unwrap();

        // The last chunk may exceed capacity on its own; nothing else is kept
        let snap = output.retrieve().unwrap();
        let data_events = snap.events.iter().filter(|e| !e.is_closed()).count();
        assert!(data_events <= 1 || output.used() <= 10);
        assert!(snap.has_closed());
    }

    #[tokio::test]
    async fn test_stdout_closed_early_still_waits_for_exit() {
        let (worker, output, running) = worker_for("exec 1>&- 2>&-; sleep 0.2; exit 4", 64);
        let handle = worker.start();
        assert!(running.load(Ordering::Acquire));

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker should finish")
            .unwrap();
        let snap = output.retrieve().unwrap();
        assert_eq!(snap.events.len(), 1);
        assert_eq!(
            snap.events[0].exit_status(),
            Some(ExitStatus::Code(4))
        );
    }
}
