//! Background reaper
//!
//! One thread per pool. Every tick it force-releases leases held past
//! `auto_release` and closes handles idle past `auto_close`. It holds only
//! a weak reference, so it exits on its own once the pool is gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::errors::{PoolError, PoolResult};
use super::pool::{PoolBackend, Shared};

pub(crate) struct Reaper {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Reaper {
    pub(crate) fn spawn<C: PoolBackend>(shared: Weak<Shared<C>>, interval: Duration) -> PoolResult<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("rowflex-pool-reaper".to_string())
            .spawn(move || reaper_loop(shared, interval, flag))
            .map_err(|e| PoolError::InvalidConfig(format!("failed to spawn reaper thread: {}", e)))?;
        Ok(Self { shutdown, handle })
    }

    /// Signals the thread and waits for it to finish
    pub(crate) fn stop(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.handle.thread().unpark();
        // a panicked reaper has nothing left to clean up
        let _ = self.handle.join();
    }
}

fn reaper_loop<C: PoolBackend>(shared: Weak<Shared<C>>, interval: Duration, shutdown: Arc<AtomicBool>) {
    loop {
        thread::park_timeout(interval);
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        match shared.upgrade() {
            Some(shared) => shared.reap(),
            None => return,
        }
    }
}
