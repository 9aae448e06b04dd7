//! Output events recorded for a supervised process

use std::fmt;

use chrono::Utc;

// ─────────────────────────────────────────────────────────
// Timestamp
// ─────────────────────────────────────────────────────────

/// Wall-clock instant with microsecond resolution, counted from the Unix epoch.
///
/// Doubles as the consumption cursor for an output buffer: each buffer hands
/// out strictly increasing timestamps (see [`Timestamp::after`]), so "every
/// event up to T" names an exact prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub fn as_micros(self) -> u64 {
        self.0
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        Self(Utc::now().timestamp_micros().max(0) as u64)
    }

    /// The current time, bumped past `previous` when the clock has not advanced
    /// (or went backwards) since the last stamp.
    pub fn after(previous: Option<Timestamp>) -> Self {
        let now = Self::now();
        match previous {
            Some(prev) if now <= prev => Self(prev.0 + 1),
            _ => now,
        }
    }
}

impl fmt::Display for Timestamp {
    /// Seconds with a six digit fraction, e.g. `1700000000.000123`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

// ─────────────────────────────────────────────────────────
// Exit Status
// ─────────────────────────────────────────────────────────

/// How a supervised process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with a status code
    Code(i32),
    /// Terminated by a signal
    Signal(i32),
    /// The exit status could not be collected
    Unknown,
}

impl ExitStatus {
    /// Integer form used on the wire: the exit code, or the negated signal
    /// number for signal deaths.
    pub fn as_raw(self) -> i32 {
        match self {
            ExitStatus::Code(code) => code,
            ExitStatus::Signal(signal) => -signal,
            ExitStatus::Unknown => -1,
        }
    }

    pub fn success(self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

// ─────────────────────────────────────────────────────────
// Output Events
// ─────────────────────────────────────────────────────────

/// Which stream an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Stdout,
    Stderr,
    /// The process exited; always the last event of a buffer
    Closed,
}

impl OutputKind {
    /// Frame tag used by the watch protocol
    pub fn tag(self) -> &'static str {
        match self {
            OutputKind::Stdout => "out",
            OutputKind::Stderr => "err",
            OutputKind::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Payload {
    Bytes(Vec<u8>),
    Status(ExitStatus),
}

/// A single immutable record in a process output buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    kind: OutputKind,
    timestamp: Timestamp,
    payload: Payload,
}

impl OutputEvent {
    pub fn stdout(timestamp: Timestamp, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: OutputKind::Stdout,
            timestamp,
            payload: Payload::Bytes(data.into()),
        }
    }

    pub fn stderr(timestamp: Timestamp, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: OutputKind::Stderr,
            timestamp,
            payload: Payload::Bytes(data.into()),
        }
    }

    pub fn closed(timestamp: Timestamp, status: ExitStatus) -> Self {
        Self {
            kind: OutputKind::Closed,
            timestamp,
            payload: Payload::Status(status),
        }
    }

    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn is_closed(&self) -> bool {
        self.kind == OutputKind::Closed
    }

    /// Captured bytes; `None` for a Closed event
    pub fn data(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Bytes(data) => Some(data),
            Payload::Status(_) => None,
        }
    }

    /// Exit status; `None` unless this is a Closed event
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self.payload {
            Payload::Status(status) => Some(status),
            Payload::Bytes(_) => None,
        }
    }

    /// Bytes this event counts against a buffer's capacity
    pub fn size(&self) -> usize {
        self.data().map_or(0, <[u8]>::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_display() {
        let ts = Timestamp::from_micros(1_700_000_000_000_123);
        assert_eq!(ts.to_string(), "1700000000.000123");
        assert_eq!(Timestamp::ZERO.to_string(), "0.000000");
    }

    #[test]
    fn test_timestamp_after_is_strictly_increasing() {
        let far_future = Timestamp::from_micros(u64::MAX / 2);
        let next = Timestamp::after(Some(far_future));
        assert_eq!(next.as_micros(), far_future.as_micros() + 1);

        let first = Timestamp::after(None);
        let second = Timestamp::after(Some(first));
        assert!(second > first);
    }

    #[test]
    fn test_exit_status_raw() {
        assert_eq!(ExitStatus::Code(3).as_raw(), 3);
        assert_eq!(ExitStatus::Signal(9).to_string(), "-9");
        assert_eq!(ExitStatus::Unknown.as_raw(), -1);
        assert!(ExitStatus::Code(0).success());
        assert!(!ExitStatus::Signal(15).success());
    }

    #[test]
    fn test_event_accessors() {
        let ts = Timestamp::from_micros(10);
        let out = OutputEvent::stdout(ts, b"hello".to_vec());
        assert_eq!(out.kind(), OutputKind::Stdout);
        assert_eq!(out.data(), Some(&b"hello"[..]));
        assert_eq!(out.size(), 5);
        assert_eq!(out.exit_status(), None);

        let closed = OutputEvent::closed(ts, ExitStatus::Code(1));
        assert!(closed.is_closed());
        assert_eq!(closed.size(), 0);
        assert_eq!(closed.exit_status(), Some(ExitStatus::Code(1)));
        assert_eq!(closed.kind().tag(), "closed");
    }
}
