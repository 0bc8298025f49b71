use parking_lot::{Condvar, Mutex};
use std::{sync::Arc, time::Duration};
use tracing::info;

/// Process wide stop signal, every sleeping loop waits on it instead of `thread::sleep`.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<(Mutex<bool>, Condvar)>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (lock, condvar) = &*self.0;
        let mut triggered = lock.lock();

        if !*triggered {
            info!("Shutdown requested");
            *triggered = true;
            condvar.notify_all();
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.0 .0.lock()
    }

    /// Sleep for `timeout` or until shutdown is triggered, whichever comes first.
    /// Returns true if shutdown was triggered.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.0;
        let mut triggered = lock.lock();

        if !*triggered {
            // spurious wake ups only shorten the sleep, callers loop anyway
            condvar.wait_for(&mut triggered, timeout);
        }

        *triggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Instant};

    #[test]
    fn wait_times_out() {
        let shutdown = Shutdown::new();
        let start = Instant::now();

        assert!(!shutdown.wait(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn trigger_wakes_waiters() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            thread::spawn(move || shutdown.wait(Duration::from_secs(30)))
        };

        thread::sleep(Duration::from_millis(20));
        shutdown.trigger();

        assert!(waiter.join().unwrap());
        assert!(shutdown.is_triggered());
        assert!(shutdown.wait(Duration::from_secs(30)));
    }
}
