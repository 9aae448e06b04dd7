//! Name → process table shared by every connection
//!
//! All access goes through [`RegistryGuard`], so holding the single registry
//! lock is enforced by the type system: spawn takes `&mut RegistryGuard`, and
//! the watch session takes the lock to remove processes it saw exit.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use tokio::sync::{Mutex, MutexGuard};

use herder_core::prelude::*;

use crate::process::Process;

/// Shared registry of live processes. Cloning shares the same table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    processes: Arc<Mutex<BTreeMap<String, Arc<Process>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the registry-wide exclusive lock
    pub async fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            processes: self.processes.lock().await,
        }
    }
}

/// Exclusive access to the registry for the guard's lifetime
pub struct RegistryGuard<'a> {
    processes: MutexGuard<'a, BTreeMap<String, Arc<Process>>>,
}

impl RegistryGuard<'_> {
    pub fn register(&mut self, name: impl Into<String>, process: Arc<Process>) {
        let name = name.into();
        debug!("Registering {}", process);
        if let Some(replaced) = self.processes.insert(name, process) {
            warn!("Registration replaced {}", replaced);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Process>> {
        self.processes.get(name).cloned()
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Process>> {
        let removed = self.processes.remove(name);
        if let Some(process) = &removed {
            debug!("Removed {} from registry", process);
        }
        removed
    }

    /// Remove `name` only if it still maps to `process`, so a watcher that
    /// saw an old process exit cannot evict a newer one registered since.
    pub fn remove_if_same(&mut self, name: &str, process: &Arc<Process>) -> bool {
        match self.processes.get(name) {
            Some(current) if Arc::ptr_eq(current, process) => {
                self.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Processes whose names match any of the shell-style `patterns`
    /// (`*` and `?` wildcards), in name order. No patterns matches everything.
    pub fn matching<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<(String, Arc<Process>)>> {
        let matchers = patterns
            .iter()
            .map(|pattern| wildcard(pattern.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        Ok(self
            .processes
            .iter()
            .filter(|(name, _)| matchers.is_empty() || matchers.iter().any(|m| m.is_match(name)))
            .map(|(name, process)| (name.clone(), Arc::clone(process)))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

/// Compile a shell-style wildcard into an anchored regex
fn wildcard(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 2);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| Error::protocol(format!("Bad pattern {pattern:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_translation() {
        let re = wildcard("web.*").unwrap();
        assert!(re.is_match("web.1"));
        assert!(re.is_match("web."));
        assert!(!re.is_match("webX1"));

        let re = wildcard("job?").unwrap();
        assert!(re.is_match("job1"));
        assert!(!re.is_match("job12"));

        let re = wildcard("exact").unwrap();
        assert!(re.is_match("exact"));
        assert!(!re.is_match("exactly"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_matching_and_removal() {
        use crate::test_utils::sh;

        let registry = Registry::new();
        let mut guard = registry.lock().await;
        let a = Process::spawn(sh("web.1", "true"), &mut guard).unwrap();
        Process::spawn(sh("web.2", "true"), &mut guard).unwrap();
        Process::spawn(sh("worker", "true"), &mut guard).unwrap();

        let names = |found: Vec<(String, Arc<Process>)>| {
            found.into_iter().map(|(name, _)| name).collect::<Vec<_>>()
        };
        assert_eq!(names(guard.matching(&["web.*"]).unwrap()), ["web.1", "web.2"]);
        assert_eq!(names(guard.matching(&["worker", "web.2"]).unwrap()), ["web.2", "worker"]);
        assert_eq!(guard.matching::<&str>(&[]).unwrap().len(), 3);
        assert!(guard.matching(&["nothing*"]).unwrap().is_empty());

        let b = guard.lookup("web.2").unwrap();
        assert!(!guard.remove_if_same("web.1", &b));
        assert!(guard.remove_if_same("web.1", &a));
        assert!(guard.lookup("web.1").is_none());
        assert_eq!(guard.len(), 2);
    }
}
