//! Child-side setup applied between fork and exec
//!
//! [`ChildSetup`] is the one place that knows how to detach a child, apply its
//! resource limits and drop its identity. The Unix implementation runs inside
//! `pre_exec`, so it must stay async-signal-safe: everything that allocates
//! (user name C string, limit list) is prepared in the parent.

use tokio::process::Command;

use crate::identity::Identity;
use crate::rlimit::Rlimit;

/// Everything the child must do to itself before running the target program
#[derive(Debug, Clone, Default)]
pub struct ChildSetup {
    merge_stderr: bool,
    rlimits: Vec<(Rlimit, u64)>,
    gid: Option<u32>,
    uid: Option<u32>,
    #[cfg(unix)]
    username: Option<std::ffi::CString>,
    #[cfg(unix)]
    inherited: Vec<std::os::fd::RawFd>,
}

impl ChildSetup {
    pub fn new(identity: &Identity, rlimits: impl IntoIterator<Item = (Rlimit, u64)>) -> Self {
        Self {
            merge_stderr: false,
            rlimits: rlimits.into_iter().collect(),
            gid: identity.gid,
            uid: identity.uid,
            #[cfg(unix)]
            username: identity
                .username
                .as_deref()
                .and_then(|name| std::ffi::CString::new(name).ok()),
            #[cfg(unix)]
            inherited: Vec::new(),
        }
    }

    /// Point the child's stderr at its stdout pipe
    pub fn merge_stderr(mut self, merge: bool) -> Self {
        self.merge_stderr = merge;
        self
    }

    /// Descriptors the child must inherit across exec
    #[cfg(unix)]
    pub fn inherit(mut self, fds: impl IntoIterator<Item = std::os::fd::RawFd>) -> Self {
        self.inherited.extend(fds);
        self
    }

    /// Register the setup on `command`
    #[cfg(unix)]
    pub fn install(self, command: &mut Command) {
        // SAFETY: `apply` only issues async-signal-safe syscalls and touches
        // data owned by the closure; it never allocates.
        unsafe {
            command.pre_exec(move || self.apply());
        }
    }

    #[cfg(not(unix))]
    pub fn install(self, _command: &mut Command) {
        if self.merge_stderr {
            tracing::warn!("Merging stderr into stdout is not supported here; stderr is discarded");
        }
        if !self.rlimits.is_empty() {
            tracing::debug!("Resource limits are not supported here; skipping");
        }
    }

    /// Runs in the child. Order matters: session first, then limits, then
    /// group, supplementary groups and finally user, because changing groups
    /// needs the privileges that `setuid` gives up.
    #[cfg(unix)]
    fn apply(&self) -> std::io::Result<()> {
        use std::io::Error;

        // SAFETY: plain syscalls on descriptors and ids owned by this process.
        unsafe {
            if self.merge_stderr && libc::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO) == -1 {
                return Err(Error::last_os_error());
            }

            for &fd in &self.inherited {
                if libc::fcntl(fd, libc::F_SETFD, 0) == -1 {
                    return Err(Error::last_os_error());
                }
            }

            if libc::setsid() == -1 {
                return Err(Error::last_os_error());
            }

            for &(limit, value) in &self.rlimits {
                let rlim = libc::rlimit {
                    rlim_cur: value as libc::rlim_t,
                    rlim_max: value as libc::rlim_t,
                };
                if libc::setrlimit(limit.resource() as _, &rlim) != 0 {
                    return Err(Error::last_os_error());
                }
            }

            if let Some(gid) = self.gid {
                if libc::setgid(gid as libc::gid_t) != 0 {
                    return Err(Error::last_os_error());
                }

                if let Some(name) = &self.username {
                    if libc::initgroups(name.as_ptr(), gid as _) != 0 {
                        let err = Error::last_os_error();
                        if err.raw_os_error() != Some(libc::ENOSYS) {
                            return Err(err);
                        }
                    }
                }
            }

            if let Some(uid) = self.uid {
                if libc::setuid(uid as libc::uid_t) != 0 {
                    return Err(Error::last_os_error());
                }
            }
        }

        Ok(())
    }
}
