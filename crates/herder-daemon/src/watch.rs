//! Pull-based output streaming to a remote watcher
//!
//! A [`WatchSession`] repeatedly drains the output buffers of the processes it
//! tracks and sends everything new as one batch:
//!
//! ```text
//! out:<name>:<timestamp>:<len>\n<raw payload>\n
//! err:<name>:<timestamp>:<len>\n<raw payload>\n
//! closed:<name>:<timestamp>:<status>\n
//! ]
//! ```
//!
//! It then waits for one acknowledgment line. Only after the ack does it trim
//! the buffers up to what was sent, so a slow watcher holds back trimming and
//! the buffers' own eviction bounds memory meanwhile. An ack of `q` stops the
//! session; processes whose Closed event was acknowledged are dropped from the
//! session and from the registry.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use herder_core::prelude::*;
use herder_core::{OutputEvent, Timestamp};

use crate::process::Process;
use crate::registry::Registry;

/// Reference polling cadence when no process has new output
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Final frame of every batch
const BATCH_TERMINATOR: &[u8] = b"] ";

// ─────────────────────────────────────────────────────────
// Connection
// ─────────────────────────────────────────────────────────

/// Duplex line-oriented stream to a watcher
#[trait_variant::make(Connection: Send)]
pub trait LocalConnection {
    /// Write raw bytes and flush them
    async fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read one line, lowercased, without its line ending. `None` on EOF.
    async fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// [`Connection`] over any buffered reader and writer pair, e.g. the halves of
/// a split `TcpStream`.
pub struct LineConnection<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> LineConnection<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read one line as sent, minus its line ending. `None` on EOF.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R, W> Connection for LineConnection<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data).await?;
        self.writer.flush().await
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.next_line().await?.map(|line| line.to_lowercase()))
    }
}

// ─────────────────────────────────────────────────────────
// Framing
// ─────────────────────────────────────────────────────────

/// Accumulates newline-joined frames for one outbound batch
#[derive(Debug, Default)]
pub struct BatchEncoder {
    buf: Vec<u8>,
    frames: usize,
}

impl BatchEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_frame(&mut self, frame: &[u8]) {
        if self.frames > 0 {
            self.buf.push(b'\n');
        }
        self.buf.extend_from_slice(frame);
        self.frames += 1;
    }

    /// Add one event for process `name`: a header frame, plus the raw payload
    /// frame for stdout/stderr data.
    pub fn push_event(&mut self, name: &str, event: &OutputEvent) {
        match (event.data(), event.exit_status()) {
            (Some(data), _) => {
                let header = format!(
                    "{}:{}:{}:{}",
                    event.kind().tag(),
                    name,
                    event.timestamp(),
                    data.len()
                );
                self.push_frame(header.as_bytes());
                self.push_frame(data);
            }
            (None, Some(status)) => {
                let header = format!(
                    "{}:{}:{}:{}",
                    event.kind().tag(),
                    name,
                    event.timestamp(),
                    status
                );
                self.push_frame(header.as_bytes());
            }
            (None, None) => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Append the terminator and return the wire bytes
    pub fn finish(mut self) -> Vec<u8> {
        self.push_frame(BATCH_TERMINATOR);
        self.buf
    }
}

// ─────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────

/// Why a watch session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// No process matched when the session started
    NothingToWatch,
    /// Every watched process exited and was acknowledged
    NothingLeftToWatch,
    /// The watcher acknowledged with `q`
    Stopped,
    /// The watcher went away mid-session
    Disconnected,
}

impl WatchOutcome {
    pub fn message(self) -> &'static str {
        match self {
            WatchOutcome::NothingToWatch => "Nothing to watch",
            WatchOutcome::NothingLeftToWatch => "Nothing left to watch",
            WatchOutcome::Stopped => "Stopped watching",
            WatchOutcome::Disconnected => "Watcher disconnected",
        }
    }
}

impl fmt::Display for WatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

struct Tracked {
    process: Arc<Process>,
    /// Newest timestamp delivered to and acknowledged by this watcher
    cursor: Timestamp,
}

/// What one batch carried for one process
struct Sent {
    name: String,
    latest: Timestamp,
    closed: bool,
}

/// One watcher's view of a set of processes
pub struct WatchSession {
    registry: Registry,
    tracked: BTreeMap<String, Tracked>,
    poll_interval: Duration,
}

impl WatchSession {
    pub fn new(registry: Registry, processes: impl IntoIterator<Item = (String, Arc<Process>)>) -> Self {
        let tracked = processes
            .into_iter()
            .map(|(name, process)| {
                let tracked = Tracked {
                    process,
                    cursor: Timestamp::ZERO,
                };
                (name, tracked)
            })
            .collect();
        Self {
            registry,
            tracked,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Number of processes still tracked
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Stream output until the watcher stops, disconnects, or every tracked
    /// process has exited.
    pub async fn run<C: Connection>(mut self, conn: &mut C) -> WatchOutcome {
        if self.tracked.is_empty() {
            return WatchOutcome::NothingToWatch;
        }

        loop {
            let (batch, sent) = self.collect();
            if batch.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            if let Err(e) = Connection::send(conn, &batch.finish()).await {
                debug!("Watcher send failed: {}", e);
                return WatchOutcome::Disconnected;
            }

            let ack = match Connection::read_line(conn).await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("Watcher closed the connection");
                    return WatchOutcome::Disconnected;
                }
                Err(e) => {
                    debug!("Watcher read failed: {}", e);
                    return WatchOutcome::Disconnected;
                }
            };

            self.acknowledge(sent).await;

            if self.tracked.is_empty() {
                return WatchOutcome::NothingLeftToWatch;
            }
            if ack == "q" {
                return WatchOutcome::Stopped;
            }
        }
    }

    /// Gather every event newer than each process's cursor into one batch
    fn collect(&self) -> (BatchEncoder, Vec<Sent>) {
        let mut batch = BatchEncoder::new();
        let mut sent = Vec::new();

        for (name, tracked) in &self.tracked {
            if let Some(snapshot) = tracked.process.watch_after(tracked.cursor) {
                for event in &snapshot.events {
                    batch.push_event(name, event);
                }
                sent.push(Sent {
                    name: name.clone(),
                    latest: snapshot.latest,
                    closed: snapshot.has_closed(),
                });
            }
        }

        (batch, sent)
    }

    /// Trim what the watcher acknowledged and retire processes seen closing
    async fn acknowledge(&mut self, sent: Vec<Sent>) {
        let mut closed = Vec::new();
        for Sent { name, latest, closed: saw_close } in sent {
            if let Some(tracked) = self.tracked.get_mut(&name) {
                tracked.process.remove_output(latest);
                tracked.cursor = latest;
                if saw_close {
                    closed.push(name);
                }
            }
        }

        if closed.is_empty() {
            return;
        }

        let mut registry = self.registry.lock().await;
        for name in closed {
            if let Some(tracked) = self.tracked.remove(&name) {
                if registry.remove_if_same(&name, &tracked.process) {
                    info!("Process {} exited and was acknowledged; removed", tracked.process);
                }
            }
        }
    }
}

/// Start a session over every registered process matching `patterns`.
///
/// Sends the `Watching <count>` announcement first; returns
/// [`WatchOutcome::NothingToWatch`] without sending anything if nothing matches.
pub async fn watch_matching<C: Connection, S: AsRef<str>>(
    registry: &Registry,
    patterns: &[S],
    poll_interval: Duration,
    conn: &mut C,
) -> Result<WatchOutcome> {
    let processes = registry.lock().await.matching(patterns)?;
    if processes.is_empty() {
        return Ok(WatchOutcome::NothingToWatch);
    }

    Connection::send(conn, format!("Watching {}\n", processes.len()).as_bytes()).await?;
    let session = WatchSession::new(registry.clone(), processes).with_poll_interval(poll_interval);
    Ok(session.run(conn).await)
}
