//! Background status reporter.
//!
//! Every ten seconds (or immediately on shutdown) logs each partition's
//! `used_bytes / capacity_bytes`. The wait uses a `Condvar` rather than a
//! plain sleep so shutdown doesn't have to wait out the last interval.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::tiered::TieredCache;

const REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Handle to the background reporter thread.
pub struct StatusReporter {
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl StatusReporter {
    /// Spawns the reporter thread.
    pub fn spawn(cache: Arc<TieredCache>) -> Self {
        let shutdown = Arc::new((Mutex::new(false), Condvar::new()));
        let shutdown_for_thread = Arc::clone(&shutdown);

        let handle = thread::spawn(move || {
            let (lock, condvar) = &*shutdown_for_thread;
            let mut guard = lock.lock().unwrap();
            loop {
                report(&cache);
                if *guard {
                    return;
                }
                let (next_guard, _timeout) = condvar.wait_timeout(guard, REPORT_INTERVAL).unwrap();
                guard = next_guard;
                if *guard {
                    return;
                }
            }
        });

        StatusReporter {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Wakes the reporter immediately and waits for it to exit.
    pub fn shutdown(mut self) {
        let (lock, condvar) = &*self.shutdown;
        *lock.lock().unwrap() = true;
        condvar.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn report(cache: &TieredCache) {
    for index in 0..cache.partition_count() {
        let partition = cache.partition(index);
        log::info!(
            "partition {index}: {}/{} bytes used ({} keys)",
            partition.used_bytes(),
            partition.capacity_bytes(),
            partition.len()
        );
    }
}
