// THEORY:
// The `TimerRegistry` is the single owner of every scheduled callback in the
// engine. Both timer chains that run during a classification (the sequencer's
// visual chain and the orchestrator's reveal gate) schedule through it, so one
// `cancel_all` tears everything down at once.
//
// Key architectural principles:
// 1.  **Arena of Handles**: Timers live in a slot arena. A fired or cancelled timer
//     returns its slot to a free list, so the arena never grows past the number of
//     timers that were outstanding at the same time.
// 2.  **Generational Ids**: Every scheduled timer gets a fresh generation number.
//     A `TimerId` that outlived its slot can never cancel the slot's next tenant.
// 3.  **Claim Before Fire**: A timer that wakes up must claim its slot under the
//     lock before running its callback. Cancellation removes the slot under the
//     same lock, so once `cancel_all` returns no cancelled callback can start.
// 4.  **Tokio Tasks**: Each timer is a spawned task sleeping on `tokio::time`; the
//     registry keeps its `AbortHandle` so cancellation also drops the task.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// Returned by [`TimerRegistry::sleep`] when the timer was cancelled before it fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timer cancelled")]
pub struct Cancelled;

/// Identifies one scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    slot: usize,
    generation: u64,
}

struct Slot {
    generation: u64,
    handle: Option<AbortHandle>,
}

#[derive(Default)]
struct RegistryInner {
    slots: Vec<Slot>,
    free: Vec<usize>,
    next_generation: u64,
    active: usize,
}

impl RegistryInner {
    fn allocate(&mut self) -> TimerId {
        self.next_generation += 1;
        let generation = self.next_generation;
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot].generation = generation;
                slot
            }
            None => {
                self.slots.push(Slot { generation, handle: None });
                self.slots.len() - 1
            }
        };
        TimerId { slot, generation }
    }

    /// Removes the timer if `id` still owns its slot.
    fn release(&mut self, id: TimerId) -> Option<AbortHandle> {
        let slot = self.slots.get_mut(id.slot)?;
        if slot.generation != id.generation {
            return None;
        }
        let handle = slot.handle.take()?;
        self.free.push(id.slot);
        self.active -= 1;
        Some(handle)
    }
}

/// A cloneable handle to the shared timer arena.
#[derive(Clone, Default)]
pub struct TimerRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `callback` once after `delay`, unless cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.lock();
        let id = inner.allocate();
        let weak: Weak<Mutex<RegistryInner>> = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(registry) = weak.upgrade() else {
                return;
            };
            let claimed = registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .release(id)
                .is_some();
            drop(registry);
            if claimed {
                callback();
            }
        });

        // The task cannot claim its slot before we release the lock, so storing
        // the handle here always happens first.
        inner.slots[id.slot].handle = Some(task.abort_handle());
        inner.active += 1;
        id
    }

    /// Cancels one timer. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&self, id: TimerId) -> bool {
        let handle = self.lock().release(id);
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every outstanding timer and returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut inner = self.lock();
        let mut cancelled = 0;
        let RegistryInner { slots, free, active, .. } = &mut *inner;
        for (index, slot) in slots.iter_mut().enumerate() {
            if let Some(handle) = slot.handle.take() {
                handle.abort();
                free.push(index);
                cancelled += 1;
            }
        }
        *active = 0;
        if cancelled > 0 {
            tracing::debug!(cancelled, "Cancelled outstanding timers");
        }
        cancelled
    }

    /// Number of timers scheduled but not yet fired or cancelled.
    pub fn active(&self) -> usize {
        self.lock().active
    }

    /// Number of slots in the arena, free or occupied.
    pub fn capacity(&self) -> usize {
        self.lock().slots.len()
    }

    /// Suspends for `delay` through the registry, so `cancel_all` interrupts it.
    pub async fn sleep(&self, delay: Duration) -> Result<(), Cancelled> {
        let (tx, rx) = oneshot::channel();
        self.schedule(delay, move || {
            let _ = tx.send(());
        });
        rx.await.map_err(|_| Cancelled)
    }
}
