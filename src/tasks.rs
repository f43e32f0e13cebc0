//! Bounded pool for fire-and-forget background work.
//!
//! Cache writes that must not hold up a response (asynchronous sets, list
//! backfills) are submitted here. The pool runs them on its own rayon
//! threads, separate from the global pool that does pixel work, and caps how
//! many may be in flight at once. A submission over the cap is refused
//! immediately rather than queued, so sustained load degrades to "fewer cache
//! writes" instead of unbounded memory growth.

use crate::error::{Error, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::error;

#[derive(Debug, Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decrements the in-flight count when a task ends, even by panic.
struct Done(Arc<InFlight>);

impl Drop for Done {
    fn drop(&mut self) {
        let mut count = self.0.lock();
        *count -= 1;
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

pub struct TaskPool {
    pool: rayon::ThreadPool,
    in_flight: Arc<InFlight>,
    capacity: usize,
}

impl TaskPool {
    /// A pool of `threads` workers accepting at most `capacity` unfinished
    /// tasks.
    pub fn new(threads: usize, capacity: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("imageserver-bg-{i}"))
            .panic_handler(|_| error!("background task panicked"))
            .build()
            .map_err(|e| Error::Internal(format!("cannot start background pool: {e}")))?;
        Ok(Self {
            pool,
            in_flight: Arc::new(InFlight::default()),
            capacity: capacity.max(1),
        })
    }

    /// Run `task` in the background, or refuse it if the pool is at capacity.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut count = self.in_flight.lock();
            if *count >= self.capacity {
                return Err(Error::Internal(format!(
                    "background write dropped: {} tasks already in flight",
                    self.capacity
                )));
            }
            *count += 1;
        }
        let done = Done(self.in_flight.clone());
        self.pool.spawn(move || {
            let _done = done;
            task();
        });
        Ok(())
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until every accepted task has finished.
    pub fn wait_idle(&self) {
        let mut count = self.in_flight.lock();
        while *count > 0 {
            count = self
                .in_flight
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
