//! Bounded pool of backend handles
//!
//! - `acquire` reuses an idle handle, creates one below capacity, or
//!   blocks until a release, the deadline, or pool close
//! - A lease releases on drop; a lease that was force-released by the
//!   reaper and whose slot has since been re-leased releases nothing
//! - Capacity bounds live handles (plus those being built), never waiters

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

use uuid::Uuid;

use super::config::PoolConfig;
use super::errors::{PoolError, PoolResult};
use super::reaper::Reaper;
use crate::observability::{Event, Logger};

/// A backend connection the pool can manage
pub trait PoolBackend: Send + Sync + 'static {
    /// Closes the underlying connection
    fn close(&self);
}

type Factory<C> = dyn Fn() -> Result<C, String> + Send + Sync;

/// Lifecycle of one pooled handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Idle,
    InUse,
    Closed,
}

struct Slot<C> {
    id: Uuid,
    backend: Arc<C>,
    state: ItemState,
    /// Bumped on every lease so stale leases can be told apart
    generation: u64,
    last_used: Instant,
}

pub(crate) struct PoolState<C> {
    slots: Vec<Slot<C>>,
    /// Handles being built by the factory outside the lock
    creating: usize,
    closed: bool,
    closed_count: usize,
}

impl<C> PoolState<C> {
    fn idle_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == ItemState::Idle)
            .count()
    }
}

pub(crate) struct Shared<C> {
    config: PoolConfig,
    factory: Box<Factory<C>>,
    state: Mutex<PoolState<C>>,
    available: Condvar,
    logger: Logger,
}

impl<C: PoolBackend> Shared<C> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState<C>> {
        // slot bookkeeping stays consistent across a panicking holder
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lease(self: &Arc<Self>, slot: &mut Slot<C>) -> PoolLease<C> {
        slot.state = ItemState::InUse;
        slot.generation += 1;
        slot.last_used = Instant::now();
        PoolLease {
            shared: Arc::clone(self),
            id: slot.id,
            generation: slot.generation,
            backend: Arc::clone(&slot.backend),
            released: false,
        }
    }

    fn release(&self, id: Uuid, generation: u64) -> bool {
        let mut state = self.lock();
        let slot = state
            .slots
            .iter_mut()
            .find(|s| s.id == id && s.generation == generation && s.state == ItemState::InUse);
        match slot {
            Some(slot) => {
                slot.state = ItemState::Idle;
                slot.last_used = Instant::now();
                drop(state);
                self.available.notify_one();
                true
            }
            None => false,
        }
    }

    /// One reaper pass: force-release long leases, close long-idle handles
    pub(crate) fn reap(&self) {
        let now = Instant::now();
        let auto_release = self.config.auto_release();
        let auto_close = self.config.auto_close();

        let mut released = Vec::new();
        let mut to_close = Vec::new();
        let mut state = self.lock();
        for slot in state.slots.iter_mut() {
            let age = now.saturating_duration_since(slot.last_used);
            match slot.state {
                ItemState::InUse if auto_release.map_or(false, |limit| age >= limit) => {
                    slot.state = ItemState::Idle;
                    slot.last_used = now;
                    released.push(slot.id);
                }
                ItemState::Idle if auto_close.map_or(false, |limit| age >= limit) => {
                    slot.state = ItemState::Closed;
                    to_close.push((slot.id, Arc::clone(&slot.backend)));
                }
                _ => {}
            }
        }
        state.slots.retain(|s| s.state != ItemState::Closed);
        state.closed_count += to_close.len();
        drop(state);

        for id in &released {
            let id = id.to_string();
            self.logger.info(
                Event::PoolItemReleased.as_str(),
                &[("id", id.as_str()), ("reason", "auto_release")],
            );
        }
        for (id, backend) in &to_close {
            backend.close();
            let id = id.to_string();
            self.logger.info(
                Event::PoolItemClosed.as_str(),
                &[("id", id.as_str()), ("reason", "auto_close")],
            );
        }
        if !released.is_empty() || !to_close.is_empty() {
            self.available.notify_all();
        }
    }
}

/// Bounded pool of `C` handles built by an injected factory
pub struct Pool<C: PoolBackend> {
    shared: Arc<Shared<C>>,
    reaper: Mutex<Option<Reaper>>,
}

impl<C: PoolBackend> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size())
            .field("count", &self.count())
            .field("idle", &self.idle_count())
            .finish()
    }
}

impl<C: PoolBackend> Pool<C> {
    /// Creates an empty pool. Handles are built lazily by `factory`; a
    /// reaper thread starts when auto-release or auto-close is set.
    pub fn new<F, E>(config: PoolConfig, factory: F, logger: Logger) -> PoolResult<Self>
    where
        F: Fn() -> Result<C, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        config.validate()?;
        let needs_reaper = config.needs_reaper();
        let interval = config.reaper_interval();
        let shared = Arc::new(Shared {
            config,
            factory: Box::new(move || factory().map_err(|e| e.to_string())),
            state: Mutex::new(PoolState {
                slots: Vec::new(),
                creating: 0,
                closed: false,
                closed_count: 0,
            }),
            available: Condvar::new(),
            logger,
        });
        let reaper = if needs_reaper {
            Some(Reaper::spawn(Arc::downgrade(&shared), interval)?)
        } else {
            None
        };
        Ok(Self {
            shared,
            reaper: Mutex::new(reaper),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Leases a handle, blocking while the pool is full
    pub fn acquire(&self) -> PoolResult<PoolLease<C>> {
        let shared = &self.shared;
        let deadline = shared.config.acquire_deadline();
        let poll = shared.config.poll_interval();
        let start = Instant::now();

        let mut state = shared.lock();
        loop {
            if state.closed {
                return Err(PoolError::Closed);
            }

            if let Some(slot) = state.slots.iter_mut().find(|s| s.state == ItemState::Idle) {
                return Ok(shared.lease(slot));
            }

            if state.slots.len() + state.creating < shared.config.size {
                state.creating += 1;
                drop(state);
                let built = (shared.factory)();
                state = shared.lock();
                state.creating -= 1;

                let backend = match built {
                    Ok(backend) => backend,
                    Err(e) => {
                        drop(state);
                        shared.available.notify_one();
                        return Err(PoolError::Factory(e));
                    }
                };
                if state.closed {
                    drop(state);
                    backend.close();
                    return Err(PoolError::Closed);
                }
                state.slots.push(Slot {
                    id: Uuid::new_v4(),
                    backend: Arc::new(backend),
                    state: ItemState::Idle,
                    generation: 0,
                    last_used: Instant::now(),
                });
                let count = state.slots.len();
                let lease = match state.slots.last_mut() {
                    Some(slot) => shared.lease(slot),
                    None => continue,
                };
                drop(state);
                let id = lease.id.to_string();
                let count = count.to_string();
                shared.logger.info(
                    Event::PoolItemCreated.as_str(),
                    &[("id", id.as_str()), ("count", count.as_str())],
                );
                return Ok(lease);
            }

            let waited = start.elapsed();
            let wait = match deadline {
                Some(limit) if waited >= limit => {
                    let err = PoolError::Exhausted {
                        waited_ms: waited.as_millis(),
                        count: state.slots.len(),
                        idle: state.idle_count(),
                        size: shared.config.size,
                    };
                    drop(state);
                    let message = err.to_string();
                    shared
                        .logger
                        .warn(Event::PoolExhausted.as_str(), &[("error", message.as_str())]);
                    return Err(err);
                }
                Some(limit) => poll.min(limit - waited),
                None => poll,
            };
            state = shared
                .available
                .wait_timeout(state, wait)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Capacity
    pub fn size(&self) -> usize {
        self.shared.config.size
    }

    /// Live handles, leased or idle
    pub fn count(&self) -> usize {
        self.shared.lock().slots.len()
    }

    pub fn idle_count(&self) -> usize {
        self.shared.lock().idle_count()
    }

    pub fn in_use_count(&self) -> usize {
        self.shared
            .lock()
            .slots
            .iter()
            .filter(|s| s.state == ItemState::InUse)
            .count()
    }

    /// Handles closed so far by the reaper or by [`close`](Self::close)
    pub fn closed_count(&self) -> usize {
        self.shared.lock().closed_count
    }

    /// Snapshot of every live handle's id and state
    pub fn items(&self) -> Vec<(Uuid, ItemState)> {
        self.shared
            .lock()
            .slots
            .iter()
            .map(|s| (s.id, s.state))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Stops the reaper, closes every backend and empties the pool.
    /// Blocked and later `acquire` calls fail with [`PoolError::Closed`].
    pub fn close(&self) {
        let reaper = self
            .reaper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(reaper) = reaper {
            reaper.stop();
        }

        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let slots = std::mem::take(&mut state.slots);
        state.closed_count += slots.len();
        drop(state);
        self.shared.available.notify_all();

        for slot in &slots {
            slot.backend.close();
        }
        let closed = slots.len().to_string();
        self.shared
            .logger
            .info(Event::PoolClosed.as_str(), &[("closed", closed.as_str())]);
    }
}

impl<C: PoolBackend> Drop for Pool<C> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A leased handle. Dereferences to the backend and returns it to the
/// pool when released or dropped.
pub struct PoolLease<C: PoolBackend> {
    shared: Arc<Shared<C>>,
    id: Uuid,
    generation: u64,
    backend: Arc<C>,
    released: bool,
}

impl<C: PoolBackend> fmt::Debug for PoolLease<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolLease")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .finish()
    }
}

impl<C: PoolBackend> PoolLease<C> {
    /// Pool item id
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn backend(&self) -> &Arc<C> {
        &self.backend
    }

    /// True while this lease still owns its slot
    pub fn is_current(&self) -> bool {
        let state = self.shared.lock();
        state
            .slots
            .iter()
            .any(|s| s.id == self.id && s.generation == self.generation && s.state == ItemState::InUse)
    }

    /// Returns the handle to the pool. Returns false when the lease had
    /// already been force-released.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.shared.release(self.id, self.generation)
    }
}

impl<C: PoolBackend> Deref for PoolLease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.backend
    }
}

impl<C: PoolBackend> Drop for PoolLease<C> {
    fn drop(&mut self) {
        if !self.released {
            self.shared.release(self.id, self.generation);
        }
    }
}
