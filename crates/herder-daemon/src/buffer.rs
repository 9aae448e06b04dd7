//! Byte-bounded output retention for one process
//!
//! [`OutputBuffer`] keeps the most recent output of a process in memory. When
//! an append pushes the retained byte count over capacity, the oldest events
//! are evicted until it fits again. Overflow never blocks the producer and is
//! never reported to consumers.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use herder_core::prelude::*;
use herder_core::{ExitStatus, OutputEvent, OutputKind, Timestamp};

/// A point-in-time copy of buffered events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Timestamp of the newest event in `events`
    pub latest: Timestamp,
    /// Events oldest first; never empty
    pub events: Vec<OutputEvent>,
}

impl Snapshot {
    pub fn has_closed(&self) -> bool {
        self.events.last().is_some_and(OutputEvent::is_closed)
    }
}

#[derive(Debug, Default)]
struct Inner {
    events: VecDeque<OutputEvent>,
    used: usize,
    last_stamp: Option<Timestamp>,
    closed: bool,
}

/// Thread-safe, time-ordered, capacity-bounded queue of [`OutputEvent`]s
#[derive(Debug)]
pub struct OutputBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves `Inner` consistent, so a poisoned
        // lock still guards valid data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append captured bytes from stdout or stderr.
    ///
    /// Returns the event's timestamp, or `None` when nothing was stored
    /// (empty data, a Closed kind, or the buffer is already closed).
    pub fn append(&self, kind: OutputKind, data: &[u8]) -> Option<Timestamp> {
        if data.is_empty() {
            return None;
        }

        let mut inner = self.lock();
        if inner.closed {
            warn!("Dropping {} bytes appended after close", data.len());
            return None;
        }

        let timestamp = Timestamp::after(inner.last_stamp);
        let event = match kind {
            OutputKind::Stdout => OutputEvent::stdout(timestamp, data),
            OutputKind::Stderr => OutputEvent::stderr(timestamp, data),
            OutputKind::Closed => {
                warn!("append() called with a Closed kind; use close()");
                return None;
            }
        };

        let size = event.size();
        if size >= self.capacity {
            if !inner.events.is_empty() {
                trace!("{} byte chunk fills the buffer, discarding backlog", size);
            }
            inner.events.clear();
            inner.used = size;
        } else {
            inner.used += size;
            while inner.used > self.capacity {
                match inner.events.pop_front() {
                    Some(evicted) => inner.used -= evicted.size(),
                    None => break,
                }
            }
        }

        inner.events.push_back(event);
        inner.last_stamp = Some(timestamp);
        Some(timestamp)
    }

    /// Record process exit. Only the first call has any effect; nothing can be
    /// appended afterwards.
    pub fn close(&self, status: ExitStatus) -> Option<Timestamp> {
        let mut inner = self.lock();
        if inner.closed {
            warn!("Output buffer closed twice, ignoring status {}", status);
            return None;
        }

        let timestamp = Timestamp::after(inner.last_stamp);
        inner.events.push_back(OutputEvent::closed(timestamp, status));
        inner.last_stamp = Some(timestamp);
        inner.closed = true;
        Some(timestamp)
    }

    /// Copy out everything currently retained
    pub fn retrieve(&self) -> Option<Snapshot> {
        self.retrieve_after(Timestamp::ZERO)
    }

    /// Copy out the retained events newer than `cursor`
    pub fn retrieve_after(&self, cursor: Timestamp) -> Option<Snapshot> {
        let inner = self.lock();
        let events: Vec<OutputEvent> = inner
            .events
            .iter()
            .filter(|event| event.timestamp() > cursor)
            .cloned()
            .collect();

        let latest = events.last()?.timestamp();
        Some(Snapshot { latest, events })
    }

    /// Drop every data event stamped at or before `up_to`. Returns how many
    /// events were removed; trimming again at the same point removes nothing.
    ///
    /// The Closed event is never trimmed: every watcher must still be able to
    /// see the exit after another watcher acknowledged it.
    pub fn remove(&self, up_to: Timestamp) -> usize {
        let mut inner = self.lock();
        let mut removed = 0;
        while inner
            .events
            .front()
            .is_some_and(|event| !event.is_closed() && event.timestamp() <= up_to)
        {
            if let Some(event) = inner.events.pop_front() {
                inner.used -= event.size();
                removed += 1;
            }
        }
        removed
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Bytes currently retained (Closed events count as zero)
    pub fn used(&self) -> usize {
        self.lock().used
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the Closed event has been appended
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
