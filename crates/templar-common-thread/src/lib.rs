//! Named worker threads with cooperative shutdown.
//!
//! The watcher worker and the back-sync poll loop both run on a
//! [`ManagedThread`]. The closure receives a [`ShutdownSignal`] it checks
//! between units of work; [`ShutdownSignal::wait`] doubles as an
//! interruptible sleep.

#![warn(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// Errors from spawning or joining a managed thread.
#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    /// The OS refused to spawn the thread.
    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        /// Thread name.
        name: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The thread panicked.
    #[error("thread '{0}' panicked")]
    Panicked(String),

    /// The thread did not finish within the allotted time. It keeps running
    /// detached.
    #[error("thread '{name}' did not stop within {timeout:?}")]
    Timeout {
        /// Thread name.
        name: String,
        /// How long we waited.
        timeout: Duration,
    },
}

/// A handle to a named, managed thread.
pub struct ManagedThread {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    wake: Mutex<Option<Sender<()>>>,
    name: String,
}

impl ManagedThread {
    /// Spawn a new named thread.
    pub fn spawn<F>(name: impl Into<String>, f: F) -> Result<Self, ThreadError>
    where
        F: FnOnce(ShutdownSignal) + Send + 'static,
    {
        let name = name.into();
        let shutdown = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(0);
        let signal = ShutdownSignal {
            flag: shutdown.clone(),
            wake: wake_rx,
        };

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || f(signal))
            .map_err(|source| ThreadError::Spawn {
                name: name.clone(),
                source,
            })?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            wake: Mutex::new(Some(wake_tx)),
            name,
        })
    }

    /// Signal the thread to shut down, waking it if it is sleeping in
    /// [`ShutdownSignal::wait`].
    pub fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Dropping the sender disconnects the channel, which wakes waiters.
        if let Ok(mut wake) = self.wake.lock() {
            wake.take();
        }
    }

    /// Wait for the thread to complete.
    pub fn join(mut self) -> Result<(), ThreadError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ThreadError::Panicked(self.name.clone())),
            None => Ok(()),
        }
    }

    /// Wait at most `timeout` for the thread to complete.
    pub fn join_timeout(mut self, timeout: Duration) -> Result<(), ThreadError> {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                // Detach; the thread finishes on its own.
                self.handle.take();
                return Err(ThreadError::Timeout {
                    name: self.name.clone(),
                    timeout,
                });
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.join()
    }

    /// Signal shutdown and wait.
    pub fn shutdown(self) -> Result<(), ThreadError> {
        self.signal_shutdown();
        self.join()
    }

    /// Signal shutdown and wait at most `timeout`.
    pub fn shutdown_timeout(self, timeout: Duration) -> Result<(), ThreadError> {
        self.signal_shutdown();
        self.join_timeout(timeout)
    }

    /// Get the thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread body has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Check if shutdown was requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        self.signal_shutdown();
        // Not joined here to avoid blocking.
    }
}

/// A signal to check for shutdown requests.
#[derive(Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    wake: Receiver<()>,
}

impl ShutdownSignal {
    /// Check if shutdown was requested.
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep until shutdown is requested or `timeout` elapses. Returns `true`
    /// if shutdown was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        // Nothing is ever sent; the channel only disconnects on shutdown.
        match self.wake.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => self.is_requested(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use test_case::test_case;

    #[test]
    fn test_managed_thread_runs_until_shutdown() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let worker = ManagedThread::spawn("counter", move |signal| {
            while !signal.is_requested() {
                c.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        worker.shutdown().unwrap();

        assert!(counter.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_wait_is_interrupted_by_shutdown() {
        let worker = ManagedThread::spawn("sleeper", |signal| {
            signal.wait(Duration::from_secs(60));
        })
        .unwrap();

        let start = Instant::now();
        worker.shutdown().unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_wait_times_out_without_shutdown() {
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        let signal = ShutdownSignal {
            flag: Arc::new(AtomicBool::new(false)),
            wake: rx,
        };

        let start = Instant::now();
        assert!(!signal.wait(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
        drop(tx);
    }

    #[test_case(Duration::from_millis(0) ; "immediately")]
    #[test_case(Duration::from_millis(20) ; "after work")]
    fn test_join_timeout_finished_thread(work: Duration) {
        let worker = ManagedThread::spawn("short", move |_| thread::sleep(work)).unwrap();
        assert!(worker.join_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_join_timeout_expires() {
        let worker = ManagedThread::spawn("stubborn", |_| {
            thread::sleep(Duration::from_millis(300));
        })
        .unwrap();

        let err = worker.shutdown_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, ThreadError::Timeout { .. }));
    }

    #[test]
    fn test_panic_is_reported() {
        let worker = ManagedThread::spawn("boom", |_| panic!("boom")).unwrap();
        assert!(matches!(worker.join(), Err(ThreadError::Panicked(name)) if name == "boom"));
    }

    #[test]
    fn test_drop_signals_shutdown() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();

        {
            let _worker = ManagedThread::spawn("dropped", move |signal| {
                signal.wait(Duration::from_secs(60));
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while !stopped.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(stopped.load(Ordering::SeqCst));
    }
}
