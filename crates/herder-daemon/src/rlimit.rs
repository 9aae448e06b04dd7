//! Resource-limit names accepted in `rlimit.<NAME>=<value>` options

use std::fmt;

use herder_core::prelude::*;

/// A resource limit the current platform can apply to a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rlimit {
    As,
    Core,
    Cpu,
    Data,
    Fsize,
    Memlock,
    Nofile,
    Nproc,
    Rss,
    Stack,
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Locks,
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Msgqueue,
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Nice,
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Rtprio,
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Rttime,
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Sigpending,
}

/// Every limit known on this platform, with its lowercase name
#[cfg(unix)]
const KNOWN: &[(&str, Rlimit)] = &[
    ("as", Rlimit::As),
    ("core", Rlimit::Core),
    ("cpu", Rlimit::Cpu),
    ("data", Rlimit::Data),
    ("fsize", Rlimit::Fsize),
    ("memlock", Rlimit::Memlock),
    ("nofile", Rlimit::Nofile),
    ("nproc", Rlimit::Nproc),
    ("rss", Rlimit::Rss),
    ("stack", Rlimit::Stack),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    ("locks", Rlimit::Locks),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    ("msgqueue", Rlimit::Msgqueue),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    ("nice", Rlimit::Nice),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    ("rtprio", Rlimit::Rtprio),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    ("rttime", Rlimit::Rttime),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    ("sigpending", Rlimit::Sigpending),
];

/// Without setrlimit there is nothing to apply, so no name is known.
#[cfg(not(unix))]
const KNOWN: &[(&str, Rlimit)] = &[];

impl Rlimit {
    /// Look up a limit by name, case-insensitively
    pub fn from_name(name: &str) -> Result<Self> {
        KNOWN
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(_, limit)| *limit)
            .ok_or_else(|| Error::unknown_rlimit(name))
    }

    pub fn name(self) -> &'static str {
        KNOWN
            .iter()
            .find(|(_, limit)| *limit == self)
            .map_or("?", |(name, _)| name)
    }

    /// The platform's `RLIMIT_*` constant
    #[cfg(unix)]
    pub(crate) fn resource(self) -> i32 {
        let raw = match self {
            Rlimit::As => libc::RLIMIT_AS,
            Rlimit::Core => libc::RLIMIT_CORE,
            Rlimit::Cpu => libc::RLIMIT_CPU,
            Rlimit::Data => libc::RLIMIT_DATA,
            Rlimit::Fsize => libc::RLIMIT_FSIZE,
            Rlimit::Memlock => libc::RLIMIT_MEMLOCK,
            Rlimit::Nofile => libc::RLIMIT_NOFILE,
            Rlimit::Nproc => libc::RLIMIT_NPROC,
            Rlimit::Rss => libc::RLIMIT_RSS,
            Rlimit::Stack => libc::RLIMIT_STACK,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Rlimit::Locks => libc::RLIMIT_LOCKS,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Rlimit::Msgqueue => libc::RLIMIT_MSGQUEUE,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Rlimit::Nice => libc::RLIMIT_NICE,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Rlimit::Rtprio => libc::RLIMIT_RTPRIO,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Rlimit::Rttime => libc::RLIMIT_RTTIME,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Rlimit::Sigpending => libc::RLIMIT_SIGPENDING,
        };
        raw as i32
    }
}

impl fmt::Display for Rlimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse one `rlimit.<name>=<value>` option into a limit and its value.
///
/// The value is applied as both the soft and the hard limit.
pub fn parse_rlimit(name: &str, value: &str) -> Result<(Rlimit, u64)> {
    let limit = Rlimit::from_name(name)?;
    let value = value
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::InvalidRlimitValue {
            name: name.to_string(),
            value: value.to_string(),
        })?;
    Ok((limit, value))
}
