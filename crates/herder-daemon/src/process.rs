//! Supervised process definition and handle

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::process::Command;
use tokio::task::JoinHandle;

use herder_core::prelude::*;
use herder_core::{parse_size, Timestamp};

use crate::buffer::{OutputBuffer, Snapshot};
use crate::capture::CaptureWorker;
use crate::identity::{self, Identity};
use crate::privilege::ChildSetup;
use crate::registry::RegistryGuard;
use crate::rlimit::{parse_rlimit, Rlimit};

/// Default per-process output retention (1 MiB)
pub const DEFAULT_OUTPUT_SIZE: usize = 1 << 20;

/// Shell used when a process is defined with `shell=true`
const SHELL: &str = "/bin/sh";

// ─────────────────────────────────────────────────────────
// Capture Modes
// ─────────────────────────────────────────────────────────

/// What to do with one of the child's output streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Send the stream to the null device
    Off,
    /// Capture into the process output buffer. The number is the selector the
    /// caller gave; retention is bounded by the process-wide output size.
    Buffer(usize),
    /// Stderr only: share the stdout pipe
    MergeWithStdout,
}

impl Capture {
    /// Parse a `stdout=` / `stderr=` selector: `0`, a positive integer, or
    /// (for stderr) `stdout`.
    pub fn parse(stream: &'static str, value: &str) -> Result<Self> {
        let value = value.trim();
        if stream == "stderr" && value.eq_ignore_ascii_case("stdout") {
            return Ok(Capture::MergeWithStdout);
        }
        match value.parse::<usize>() {
            Ok(0) => Ok(Capture::Off),
            Ok(n) => Ok(Capture::Buffer(n)),
            Err(_) => Err(Error::InvalidCapture {
                stream,
                value: value.to_string(),
            }),
        }
    }

    pub fn is_off(self) -> bool {
        self == Capture::Off
    }
}

// ─────────────────────────────────────────────────────────
// Process Configuration
// ─────────────────────────────────────────────────────────

/// Validated definition of a process, before anything touches the OS.
///
/// Two definitions compare equal exactly when re-registering one under the
/// other's name is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    pub name: String,
    pub args: Vec<String>,
    pub shell: bool,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub rlimits: BTreeMap<Rlimit, u64>,
    pub identity: Identity,
    pub stdout: Capture,
    pub stderr: Capture,
    pub output_size: usize,
}

impl ProcessConfig {
    pub fn builder(name: impl Into<String>, args: Vec<String>) -> ProcessConfigBuilder {
        ProcessConfigBuilder {
            name: name.into(),
            args,
            shell: false,
            working_dir: None,
            env: BTreeMap::new(),
            rlimits: BTreeMap::new(),
            user: None,
            group: None,
            stdout: Capture::Buffer(1),
            stderr: Capture::Buffer(1),
            output_size: DEFAULT_OUTPUT_SIZE,
        }
    }

    /// Whether any stream feeds the output buffer
    pub fn captures_output(&self) -> bool {
        !self.stdout.is_off() || !self.stderr.is_off()
    }

    fn command(&self) -> Command {
        let mut command = if self.shell {
            let mut command = Command::new(SHELL);
            command.arg("-c").arg(self.args.join(" "));
            command
        } else {
            let mut command = Command::new(&self.args[0]);
            command.args(&self.args[1..]);
            command
        };

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        if !self.env.is_empty() {
            command.env_clear().envs(&self.env);
        }

        command.stdin(Stdio::null());
        command.stdout(if self.stdout.is_off() {
            Stdio::null()
        } else {
            Stdio::piped()
        });
        command.stderr(match self.stderr {
            Capture::Buffer(_) => Stdio::piped(),
            // Replaced with the stdout pipe in the child
            Capture::Off | Capture::MergeWithStdout => Stdio::null(),
        });
        command
    }
}

/// Collects process options and validates them in [`ProcessConfigBuilder::build`]
#[derive(Debug, Clone)]
pub struct ProcessConfigBuilder {
    name: String,
    args: Vec<String>,
    shell: bool,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    rlimits: BTreeMap<Rlimit, u64>,
    user: Option<String>,
    group: Option<String>,
    stdout: Capture,
    stderr: Capture,
    output_size: usize,
}

impl ProcessConfigBuilder {
    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn rlimit(mut self, limit: Rlimit, value: u64) -> Self {
        self.rlimits.insert(limit, value);
        self
    }

    /// User id or name; resolved in `build()`
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Group id or name; resolved in `build()`
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn stdout(mut self, capture: Capture) -> Self {
        self.stdout = capture;
        self
    }

    pub fn stderr(mut self, capture: Capture) -> Self {
        self.stderr = capture;
        self
    }

    /// Output buffer capacity in bytes; 0 disables capture entirely
    pub fn output_size(mut self, bytes: usize) -> Self {
        self.output_size = bytes;
        self
    }

    /// Apply one textual `key=value` option as accepted on the command line
    pub fn option(self, key: &str, value: &str) -> Result<Self> {
        if let Some(var) = key.strip_prefix("env.") {
            return Ok(self.env(var, value));
        }
        if let Some(limit) = key.strip_prefix("rlimit.") {
            let (limit, value) = parse_rlimit(limit, value)?;
            return Ok(self.rlimit(limit, value));
        }

        Ok(match key {
            "uid" => self.user(value),
            "gid" => self.group(value),
            "working_dir" => self.working_dir(value),
            "shell" => self.shell(parse_flag(value)?),
            "output" => self.output_size(parse_size(value)?),
            "stdout" => self.stdout(Capture::parse("stdout", value)?),
            "stderr" => self.stderr(Capture::parse("stderr", value)?),
            other => return Err(Error::config(format!("Unknown process option {other:?}"))),
        })
    }

    pub fn build(self) -> Result<ProcessConfig> {
        if self.name.is_empty() || self.name.contains(|c: char| c.is_whitespace() || c == ':') {
            return Err(Error::invalid_name(self.name));
        }
        if self.args.is_empty() {
            return Err(Error::EmptyCommand { name: self.name });
        }
        if let Some(dir) = &self.working_dir {
            if !dir.is_absolute() {
                return Err(Error::InvalidWorkingDir { path: dir.clone() });
            }
        }

        let identity = identity::resolve(self.user.as_deref(), self.group.as_deref())?;

        let (stdout, stderr) = match (self.output_size, self.stdout, self.stderr) {
            (0, _, _) => (Capture::Off, Capture::Off),
            (_, Capture::Off, Capture::MergeWithStdout) => (Capture::Off, Capture::Off),
            (_, stdout, stderr) => (stdout, stderr),
        };

        Ok(ProcessConfig {
            name: self.name,
            args: self.args,
            shell: self.shell,
            working_dir: self.working_dir,
            env: self.env,
            rlimits: self.rlimits,
            identity,
            stdout,
            stderr,
            output_size: self.output_size,
        })
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!("Expected a boolean, not {value:?}"))),
    }
}

// ─────────────────────────────────────────────────────────
// Process Handle
// ─────────────────────────────────────────────────────────

/// A spawned OS process, its retained output and its capture worker.
///
/// The capture worker owns the `Child` and its pipes. The handle only shares
/// the output buffer and the `running` flag with it, so exit becomes visible
/// by polling [`Process::watch`] or [`Process::is_running`].
pub struct Process {
    config: ProcessConfig,
    pid: u32,
    running: Arc<AtomicBool>,
    output: Arc<OutputBuffer>,
    worker: JoinHandle<()>,
}

impl Process {
    /// Spawn `config` and register it, or return the live process already
    /// registered under the same name with an identical definition.
    ///
    /// Must be called with the registry lock held (the guard proves it) and
    /// from within a tokio runtime.
    pub fn spawn(config: ProcessConfig, registry: &mut RegistryGuard<'_>) -> Result<Arc<Self>> {
        if let Some(existing) = Self::existing(&config, registry)? {
            return Ok(existing);
        }

        let setup = Self::child_setup(&config);
        let process = Self::launch(config, setup)?;
        Ok(Self::register(process, registry))
    }

    /// Like [`Process::spawn`], additionally handing `inherited` descriptors to
    /// the child. The parent's copies are closed once the child exists.
    #[cfg(unix)]
    pub fn spawn_inheriting(
        config: ProcessConfig,
        inherited: Vec<std::os::fd::OwnedFd>,
        registry: &mut RegistryGuard<'_>,
    ) -> Result<Arc<Self>> {
        use std::os::fd::AsRawFd;

        if let Some(existing) = Self::existing(&config, registry)? {
            return Ok(existing);
        }

        let setup = Self::child_setup(&config).inherit(inherited.iter().map(AsRawFd::as_raw_fd));
        let process = Self::launch(config, setup);
        drop(inherited);
        Ok(Self::register(process?, registry))
    }

    fn child_setup(config: &ProcessConfig) -> ChildSetup {
        ChildSetup::new(&config.identity, config.rlimits.clone())
            .merge_stderr(config.stderr == Capture::MergeWithStdout)
    }

    fn register(process: Self, registry: &mut RegistryGuard<'_>) -> Arc<Self> {
        let process = Arc::new(process);
        registry.register(process.name(), Arc::clone(&process));
        process
    }

    fn existing(config: &ProcessConfig, registry: &RegistryGuard<'_>) -> Result<Option<Arc<Self>>> {
        match registry.lookup(&config.name) {
            Some(existing) if existing.config == *config => {
                debug!("Process {} already running with identical definition", existing);
                Ok(Some(existing))
            }
            Some(existing) => Err(Error::NameInUse {
                name: config.name.clone(),
                existing: existing.to_string(),
            }),
            None => Ok(None),
        }
    }

    fn launch(config: ProcessConfig, setup: ChildSetup) -> Result<Self> {
        let mut command = config.command();
        setup.install(&mut command);

        info!("Spawning {}: {}", config.name, config.args.join(" "));
        if !config.identity.is_default() {
            debug!(
                "{} runs as uid={:?} gid={:?}",
                config.name, config.identity.uid, config.identity.gid
            );
        }
        let mut child = command.spawn().map_err(|e| Error::ProcessSpawn {
            name: config.name.clone(),
            reason: e.to_string(),
        })?;
        drop(command);

        let pid = child.id().unwrap_or(0);
        info!("Process {} started with PID: {}", config.name, pid);

        let output = Arc::new(OutputBuffer::new(config.output_size));
        let running = Arc::new(AtomicBool::new(true));

        let worker = CaptureWorker {
            name: config.name.clone(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
            output: Arc::clone(&output),
            running: Arc::clone(&running),
        }
        .start();

        Ok(Self {
            config,
            pid,
            running,
            output,
            worker,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Cleared by the capture worker once the exit status has been recorded
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// Everything currently retained, with the newest timestamp
    pub fn watch(&self) -> Option<Snapshot> {
        self.output.retrieve()
    }

    /// Retained events newer than `cursor`
    pub fn watch_after(&self, cursor: Timestamp) -> Option<Snapshot> {
        self.output.retrieve_after(cursor)
    }

    /// Discard output up to and including `timestamp`
    pub fn remove_output(&self, timestamp: Timestamp) {
        let removed = self.output.remove(timestamp);
        trace!("{}: trimmed {} events up to {}", self.name(), removed, timestamp);
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pid={}", self.config.name, self.pid)
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("name", &self.config.name)
            .field("pid", &self.pid)
            .field("running", &self.is_running())
            .field("capture_done", &self.worker.is_finished())
            .finish()
    }
}
