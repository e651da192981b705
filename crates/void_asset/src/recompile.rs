//! Pending recompile requests
//!
//! Source watchers request script library rebuilds per protocol; the
//! application loop drains them. The state is an explicit object owned by
//! the pipeline context and shared by reference.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

/// When the pending rebuild should run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RecompileCommand {
    /// Nothing requested
    None = 0,
    /// Run when the next scheduled point is reached
    CompileAtSchedule = 1,
    /// Run as soon as possible
    CompileNow = 2,
}

impl From<u8> for RecompileCommand {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::CompileAtSchedule,
            2 => Self::CompileNow,
            _ => Self::None,
        }
    }
}

/// Synchronized set of protocols awaiting a rebuild
#[derive(Debug)]
pub struct RecompileRequests {
    command: AtomicU8,
    protocols: Mutex<Vec<String>>,
}

impl Default for RecompileRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl RecompileRequests {
    pub fn new() -> Self {
        Self {
            command: AtomicU8::new(RecompileCommand::None as u8),
            protocols: Mutex::new(Vec::new()),
        }
    }

    /// Request a rebuild of `protocol`
    ///
    /// Duplicate protocols are ignored. A `now` request upgrades a scheduled one
    /// but is never downgraded.
    pub fn set_needs_recompile(&self, protocol: &str, now: bool) {
        {
            let mut protocols = self.protocols.lock();
            if !protocols.iter().any(|p| p == protocol) {
                protocols.push(protocol.to_string());
            }
        }

        let requested = if now {
            RecompileCommand::CompileNow
        } else {
            RecompileCommand::CompileAtSchedule
        };
        self.command.fetch_max(requested as u8, Ordering::AcqRel);
        log::debug!("Recompile requested for '{}' ({:?})", protocol, requested);
    }

    /// Current command
    pub fn command(&self) -> RecompileCommand {
        RecompileCommand::from(self.command.load(Ordering::Acquire))
    }

    /// Whether any protocol is waiting
    pub fn has_pending(&self) -> bool {
        !self.protocols.lock().is_empty()
    }

    /// Drain pending protocols and clear the command
    pub fn take_pending(&self) -> Vec<String> {
        let mut protocols = self.protocols.lock();
        self.command.store(RecompileCommand::None as u8, Ordering::Release);
        std::mem::take(&mut *protocols)
    }

    /// Forget every request
    pub fn reset(&self) {
        self.take_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_dedup_and_take() {
        let requests = RecompileRequests::new();
        assert_eq!(requests.command(), RecompileCommand::None);

        requests.set_needs_recompile("app", false);
        requests.set_needs_recompile("app", false);
        requests.set_needs_recompile("engine", false);

        assert_eq!(requests.command(), RecompileCommand::CompileAtSchedule);
        assert_eq!(requests.take_pending(), vec!["app".to_string(), "engine".to_string()]);
        assert_eq!(requests.command(), RecompileCommand::None);
        assert!(!requests.has_pending());
    }

    #[test]
    fn test_now_is_not_downgraded() {
        let requests = RecompileRequests::new();
        requests.set_needs_recompile("app", true);
        requests.set_needs_recompile("app", false);
        assert_eq!(requests.command(), RecompileCommand::CompileNow);

        requests.reset();
        assert_eq!(requests.command(), RecompileCommand::None);
    }

    #[test]
    fn test_concurrent_requests() {
        let requests = Arc::new(RecompileRequests::new());
        std::thread::scope(|s| {
            for i in 0..8 {
                let requests = requests.clone();
                s.spawn(move || requests.set_needs_recompile(if i % 2 == 0 { "app" } else { "engine" }, false));
            }
        });
        let mut pending = requests.take_pending();
        pending.sort();
        assert_eq!(pending, vec!["app".to_string(), "engine".to_string()]);
    }
}
