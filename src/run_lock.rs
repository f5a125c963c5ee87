//! Run exclusion for the ETL.
//!
//! One run at a time per process. The scheduler and a manual `--once`
//! trigger share the same `RunLock`; whoever comes second skips instead
//! of queueing behind the first.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;

/// Snapshot of the run currently holding the lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveRun {
    /// What triggered the run (`scheduled`, `manual`, ...).
    pub trigger: String,
    pub started_at: NaiveDateTime,
}

pub struct RunLock {
    lock: Mutex<()>,
    current: Mutex<Option<ActiveRun>>,
}

impl RunLock {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            current: Mutex::new(None),
        }
    }

    /// Take the lock without blocking. `None` when another run holds it.
    /// A lock left poisoned by a panicked run is taken over.
    pub fn try_acquire(&self, trigger: &str) -> Option<RunGuard<'_>> {
        let guard = match self.lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return None,
            Err(TryLockError::Poisoned(poisoned)) => {
                tracing::error!(trigger, "Previous metrics run panicked, releasing its lock");
                poisoned.into_inner()
            }
        };
        self.set_current(trigger);
        Some(RunGuard {
            _guard: guard,
            owner: self,
        })
    }

    pub fn current_run(&self) -> Option<ActiveRun> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_current(&self, trigger: &str) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(ActiveRun {
            trigger: trigger.to_string(),
            started_at: Utc::now().naive_utc(),
        });
    }

    fn clear_current(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Default for RunLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the duration of a run; dropping it releases the lock.
pub struct RunGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    owner: &'a RunLock,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.owner.clear_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn new_lock_is_idle() {
        let lock = RunLock::new();
        assert!(lock.current_run().is_none());
    }

    #[test]
    fn second_acquire_is_refused_while_held() {
        let lock = RunLock::new();
        let _guard = lock.try_acquire("scheduled").unwrap();
        assert!(lock.try_acquire("manual").is_none());
        assert_eq!(lock.current_run().unwrap().trigger, "scheduled");
    }

    #[test]
    fn dropping_guard_releases() {
        let lock = RunLock::new();
        {
            let _guard = lock.try_acquire("manual").unwrap();
        }
        assert!(lock.current_run().is_none());
        assert!(lock.try_acquire("manual").is_some());
    }

    #[test]
    fn other_thread_is_refused() {
        let lock = Arc::new(RunLock::new());
        let _guard = lock.try_acquire("scheduled").unwrap();

        let shared = lock.clone();
        let acquired = std::thread::spawn(move || shared.try_acquire("manual").is_some())
            .join()
            .unwrap();
        assert!(!acquired);
    }

    #[test]
    fn panicked_run_does_not_block_later_runs() {
        let lock = Arc::new(RunLock::new());
        let shared = lock.clone();
        let result = std::thread::spawn(move || {
            let _guard = shared.try_acquire("scheduled").unwrap();
            panic!("run aborted");
        })
        .join();
        assert!(result.is_err());

        let guard = lock.try_acquire("manual");
        assert!(guard.is_some());
        assert_eq!(lock.current_run().unwrap().trigger, "manual");
    }
}
