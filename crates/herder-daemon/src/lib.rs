//! # herder-daemon - Process Supervision
//!
//! Spawns supervised child processes, captures their output into bounded
//! buffers and streams that output to remote watchers.
//!
//! Depends on [`herder_core`] for the event model and error handling.
//!
//! ## Public API
//!
//! ### Processes
//! - [`ProcessConfig`] / [`ProcessConfigBuilder`] - Validated process definition
//! - [`Process`] - Spawned process handle with its output buffer
//! - [`Capture`] - Per-stream capture selector
//! - [`Registry`] / [`RegistryGuard`] - Name to process table behind one lock
//!
//! ### Output
//! - [`OutputBuffer`] - Bounded, thread-safe event buffer
//! - [`Snapshot`] - Events retrieved from a buffer with the newest timestamp
//!
//! ### Child Setup
//! - [`Rlimit`] / [`parse_rlimit()`] - Named resource limits
//! - [`Identity`] - Resolved uid/gid to run as
//! - [`ChildSetup`] - Session, limits and identity applied before exec
//!
//! ### Watching
//! - [`WatchSession`] - Batch/acknowledge loop over a set of processes
//! - [`watch_matching()`] - Start a session for every process matching a pattern
//! - [`Connection`] / [`LineConnection`] - Line-oriented watcher transport
//! - [`BatchEncoder`] - Wire framing of one batch

pub mod buffer;
mod capture;
pub mod identity;
pub mod privilege;
pub mod process;
pub mod registry;
pub mod rlimit;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod watch;

// Public API re-exports
pub use buffer::{OutputBuffer, Snapshot};
pub use identity::Identity;
pub use privilege::ChildSetup;
pub use process::{Capture, Process, ProcessConfig, ProcessConfigBuilder, DEFAULT_OUTPUT_SIZE};
pub use registry::{Registry, RegistryGuard};
pub use rlimit::{parse_rlimit, Rlimit};
pub use watch::{
    watch_matching, BatchEncoder, Connection, LineConnection, LocalConnection, WatchOutcome,
    WatchSession, DEFAULT_POLL_INTERVAL,
};
