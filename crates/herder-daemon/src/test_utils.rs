//! Test utilities for supervised processes
//!
//! Provides helpers for defining short shell processes and waiting on them.

use std::time::{Duration, Instant};

use crate::process::{Process, ProcessConfig};

/// Poll interval used while waiting on a process
const POLL: Duration = Duration::from_millis(10);

/// Creates a process definition that runs `script` with `/bin/sh -c`.
///
/// # Arguments
/// * `name` - Registry name; must be a valid process name
/// * `script` - Shell script passed to `-c`
///
/// # Panics
/// If `name` is not a valid process name.
pub fn sh(name: &str, script: &str) -> ProcessConfig {
    ProcessConfig::builder(
        name,
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()],
    )
    .build()
    .expect("test process definition should be valid")
}

/// Waits until `process` has exited and its Closed event is buffered.
///
/// Returns `false` if that did not happen within `timeout`.
pub async fn wait_until_closed(process: &Process, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if process.output().is_closed() && !process.is_running() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL).await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn test_sh_definition() {
        let config = sh("job", "exit 0");
        assert_eq!(config.name, "job");
        assert_eq!(config.args, ["/bin/sh", "-c", "exit 0"]);
        assert!(!config.shell);
    }

    #[tokio::test]
    async fn test_wait_until_closed_times_out() {
        let registry = Registry::new();
        let process = Process::spawn(sh("sleeper", "sleep 5"), &mut registry.lock().await).unwrap();
        assert!(!wait_until_closed(&process, Duration::from_millis(50)).await);
    }
}
