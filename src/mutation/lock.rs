//! Single-writer lock
//!
//! Every insert, update and delete holds the writer lock for its whole batch.
//! The lock is never re-entered and never held across two calls. Acquisition
//! waits at most the configured budget, then fails with `Timeout`.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::errors::{DbError, DbResult};
use crate::observability::{log_event, Event, Logger};

/// Mutual-exclusion collaborator
pub trait WriterLock: Send + Sync {
    /// Waits up to `timeout`; true when the lock is now held
    fn try_acquire(&self, timeout: Duration) -> bool;

    fn release(&self);
}

/// In-process lock shared by every engine holding the same instance
#[derive(Debug, Default)]
pub struct ProcessLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl ProcessLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WriterLock for ProcessLock {
    fn try_acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock().unwrap();
        while *held {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.released.wait_timeout(held, deadline - now).unwrap();
            held = guard;
        }
        *held = true;
        true
    }

    fn release(&self) {
        let mut held = self.held.lock().unwrap();
        *held = false;
        self.released.notify_one();
    }
}

/// Cross-process lock: an exclusive lock file created with `create_new`
#[derive(Clone)]
pub struct FileLock {
    path: PathBuf,
    poll_interval: Duration,
    logger: Option<Arc<dyn Logger>>,
}

impl fmt::Debug for FileLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLock")
            .field("path", &self.path)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: Duration::from_millis(25),
            logger: None,
        }
    }

    /// Failed releases are logged as `LOCK_RELEASE_FAILED`
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn try_create(&self) -> bool {
        // AlreadyExists means another writer holds it; other errors also
        // leave the lock unacquired
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .is_ok()
    }
}

impl WriterLock for FileLock {
    fn try_acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_create() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    fn release(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                let path = self.path.display().to_string();
                let error = e.to_string();
                log_event(
                    self.logger.as_deref(),
                    Event::LockReleaseFailed,
                    &[("path", path.as_str()), ("error", error.as_str())],
                );
            }
        }
    }
}

/// Holds the writer lock; releases it on drop (every exit path)
pub struct LockGuard<'a> {
    lock: &'a dyn WriterLock,
}

impl<'a> LockGuard<'a> {
    pub fn acquire(lock: &'a dyn WriterLock, timeout: Duration) -> DbResult<Self> {
        let started = Instant::now();
        if lock.try_acquire(timeout) {
            Ok(Self { lock })
        } else {
            Err(DbError::timeout(started.elapsed().as_millis()))
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
