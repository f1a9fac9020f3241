//! Default, thread-backed implementations of [`JobRunner`] and [`Timer`].
//!
//! Production code uses these; tests typically substitute a synchronous
//! `JobRunner` (run the closure in place) and a manually-fired `Timer` for
//! determinism — see `tests/`.

use std::time::Duration;

use clone_collab::traits::{JobRunner, Timer};

/// Spawns one OS thread per job.
#[derive(Debug, Default)]
pub struct ThreadJobRunner;

impl JobRunner for ThreadJobRunner {
    fn spawn(&self, job: Box<dyn FnOnce() + Send>) {
        std::thread::spawn(job);
    }
}

/// Fires a callback on a dedicated background thread every `interval`,
/// until dropped.
pub struct IntervalTimer {
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
    handles: std::sync::Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl Default for IntervalTimer {
    fn default() -> Self {
        Self {
            stop: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
            handles: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Timer for IntervalTimer {
    fn schedule(&self, interval: Duration, callback: Box<dyn Fn() + Send + Sync>) {
        let stop = self.stop.clone();
        let handle = std::thread::spawn(move || {
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                std::thread::sleep(interval);
                if stop.load(std::sync::atomic::Ordering::Relaxed) {
                    break;
                }
                callback();
            }
        });
        if let Ok(mut handles) = self.handles.lock() {
            handles.push(handle);
        }
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                let _ = handle.join();
            }
        }
    }
}
