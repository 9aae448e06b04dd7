//! # herder-core - Core Domain Types
//!
//! Foundation crate for herder. Provides error handling, the output event
//! model shared by the capture and watch machinery, byte-size parsing and
//! logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (chrono, thiserror, tracing, dirs).
//!
//! ## Public API
//!
//! ### Events (`events`)
//! - [`OutputEvent`] - A timestamped chunk of stdout/stderr, or a process exit
//! - [`OutputKind`] - Stdout, Stderr or Closed
//! - [`Timestamp`] - Microsecond wall-clock stamp, also used as a read cursor
//! - [`ExitStatus`] - Exit code or terminating signal
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with configuration vs runtime classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ### Sizes (`size`)
//! - [`parse_size()`] - Parse `1m`-style buffer sizes
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use herder_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod prelude;
pub mod size;

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use events::{ExitStatus, OutputEvent, OutputKind, Timestamp};
pub use size::parse_size;
