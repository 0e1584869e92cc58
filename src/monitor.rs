//! Progress reporting and cooperative cancellation.
//!
//! Every long-running operation takes a `&dyn Monitor` and calls
//! [`Monitor::check_cancel`] at its checkpoints. A cancelled operation returns
//! [`Error::Cancelled`] and leaves its inputs untouched.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

pub trait Monitor: Send + Sync {
    fn is_cancelled(&self) -> bool;

    /// Requests cancellation. Operations observe it at their next checkpoint.
    fn cancel(&self);

    fn check_cancel(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_task_name(&self, _name: &str) {}

    fn set_remaining_work(&self, _work: u64) {}

    /// Marks one unit of work as done.
    fn step(&self) {}
}

/// A monitor that is never cancelled and discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl Monitor for NullMonitor {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn cancel(&self) {}
}

#[derive(Debug, Default)]
struct Progress {
    cancelled: AtomicBool,
    remaining: AtomicU64,
    worked: AtomicU64,
    task: Mutex<String>,
}

/// Thread-safe monitor that tracks progress and can be cancelled from any
/// clone of it.
#[derive(Debug, Default, Clone)]
pub struct ProgressMonitor {
    inner: Arc<Progress>,
}

impl ProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn worked(&self) -> u64 {
        self.inner.worked.load(Ordering::Relaxed)
    }

    pub fn remaining(&self) -> u64 {
        self.inner.remaining.load(Ordering::Relaxed)
    }

    pub fn task_name(&self) -> String {
        self.inner.task.lock().map(|task| task.clone()).unwrap_or_default()
    }
}

impl Monitor for ProgressMonitor {
    fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        log::debug!("Cancellation requested");
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    fn set_task_name(&self, name: &str) {
        log::info!("{}", name);
        if let Ok(mut task) = self.inner.task.lock() {
            *task = name.to_string();
        }
    }

    fn set_remaining_work(&self, work: u64) {
        self.inner.remaining.store(work, Ordering::Relaxed);
        self.inner.worked.store(0, Ordering::Relaxed);
    }

    fn step(&self) {
        let worked = self.inner.worked.fetch_add(1, Ordering::Relaxed) + 1;
        let remaining = self.remaining();
        if remaining > 0 && worked % 1024 == 0 {
            log::debug!("{}: {}/{}", self.task_name(), worked, remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_null_monitor_never_cancels() {
        let monitor = NullMonitor;
        monitor.cancel();
        assert!(monitor.check_cancel().is_ok());
    }

    #[test]
    fn test_cancel_visible_through_clones() {
        let monitor = ProgressMonitor::new();
        let other = monitor.clone();
        assert!(monitor.check_cancel().is_ok());
        other.cancel();
        assert_eq!(monitor.check_cancel(), Err(Error::Cancelled));
    }

    #[test]
    fn test_progress() {
        let monitor = ProgressMonitor::new();
        monitor.set_task_name("Slicing");
        monitor.set_remaining_work(3);
        monitor.step();
        monitor.step();
        assert_eq!(monitor.worked(), 2);
        assert_eq!(monitor.remaining(), 3);
        assert_eq!(monitor.task_name(), "Slicing");
    }
}
