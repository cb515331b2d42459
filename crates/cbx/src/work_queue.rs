//! 📬 WorkQueue: a deduplicating, rate-limited queue of keys.
//!
//! 🎬 *[INT. POST OFFICE. A key arrives. Then the same key arrives again. The clerk
//! does not make a second pile.]*
//!
//! The rules, which every controller ends up needing and nobody enjoys writing:
//! - A key waiting in the queue is there once, however many times it was added.
//! - A key being processed is never handed to a second worker. Adding it while it is
//!   in flight marks it dirty, and `done` puts it back in line.
//! - Failures are counted per key, and `add_rate_limited` waits `base * 2^failures`
//!   (capped) before re-adding. `forget` wipes the slate.
//! - After `shut_down`, adds are ignored and every `get` returns `None` once the
//!   backlog is gone.
//!
//! 🔒 A plain `std::sync::Mutex` guards the state. No lock is ever held across an
//! `.await`, so there is nothing for a tokio mutex to buy us here.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

/// ⏱️ Backoff bounds for `add_rate_limited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(60),
        }
    }
}

impl Backoff {
    /// 📈 `base * 2^failures`, capped at `max`. Saturates instead of overflowing.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let the_factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.base.saturating_mul(the_factor).min(self.max)
    }
}

#[derive(Debug)]
struct QueueState<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    failures: HashMap<T, u32>,
    shutting_down: bool,
}

impl<T> Default for QueueState<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            failures: HashMap::new(),
            shutting_down: false,
        }
    }
}

#[derive(Debug)]
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    backoff: Backoff,
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            backoff,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // -- state stays consistent across every critical section, poison or not
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// ➕ Marks `item` as needing work. Duplicates coalesce; in-flight keys wait for `done`.
    pub fn add(&self, item: T) {
        let mut the_state = self.lock();
        if the_state.shutting_down || the_state.dirty.contains(&item) {
            return;
        }
        the_state.dirty.insert(item.clone());
        if the_state.processing.contains(&item) {
            return;
        }
        the_state.queue.push_back(item);
        drop(the_state);
        self.notify.notify_one();
    }

    /// 📥 Waits for the next key. `None` means the queue is shut down and drained.
    pub async fn get(&self) -> Option<T> {
        loop {
            let the_notified = self.notify.notified();
            tokio::pin!(the_notified);
            // -- register interest before looking, so an add between the check and the await is not lost
            the_notified.as_mut().enable();

            {
                let mut the_state = self.lock();
                if let Some(the_item) = the_state.queue.pop_front() {
                    the_state.dirty.remove(&the_item);
                    the_state.processing.insert(the_item.clone());
                    let the_more_waiting = !the_state.queue.is_empty();
                    drop(the_state);
                    if the_more_waiting {
                        self.notify.notify_one();
                    }
                    return Some(the_item);
                }
                if the_state.shutting_down {
                    return None;
                }
            }

            the_notified.await;
        }
    }

    /// ✅ The worker is finished with `item`. If it was re-added meanwhile, it goes back in line.
    pub fn done(&self, item: &T) {
        let mut the_state = self.lock();
        the_state.processing.remove(item);
        if the_state.dirty.contains(item) {
            the_state.queue.push_back(item.clone());
            drop(the_state);
            self.notify.notify_one();
        }
    }

    /// ⏰ Adds `item` after `delay`, from a background task.
    pub fn add_after(self: &Arc<Self>, item: T, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }
        let the_queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            the_queue.add(item);
        });
    }

    /// 🔄 Counts a failure for `item` and re-adds it after the exponential backoff delay.
    pub fn add_rate_limited(self: &Arc<Self>, item: T) {
        let the_failures = {
            let mut the_state = self.lock();
            let the_count = the_state.failures.entry(item.clone()).or_insert(0);
            let the_previous = *the_count;
            *the_count = the_count.saturating_add(1);
            the_previous
        };
        self.add_after(item, self.backoff.delay_for(the_failures));
    }

    /// 🧽 Clears the failure count for `item`.
    pub fn forget(&self, item: &T) {
        self.lock().failures.remove(item);
    }

    /// 🔢 How many times `item` went through `add_rate_limited` since the last `forget`.
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.lock().failures.get(item).copied().unwrap_or(0)
    }

    /// 🛑 Stops accepting work and wakes every waiter.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// 📏 Keys waiting in line. In-flight keys don't count.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
