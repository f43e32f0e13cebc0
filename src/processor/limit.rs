//! Concurrency gate.
//!
//! Expensive transforms (subprocesses, huge resizes) are wrapped in a
//! [`LimitProcessor`] so that at most `n` run at once. Callers over the limit
//! block until a slot frees; nothing is rejected.

use super::Processor;
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::params::Params;
use crate::pixel::PixelBuffer;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    available: Mutex<usize>,
    freed: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            available: Mutex::new(permits.max(1)),
            freed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.available.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn acquire(&self) -> Permit<'_> {
        let mut available = self.lock();
        while *available == 0 {
            available = self
                .freed
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        Permit(self)
    }

    pub fn available(&self) -> usize {
        *self.lock()
    }
}

/// Returns its slot on drop.
pub struct Permit<'a>(&'a Semaphore);

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        *self.0.lock() += 1;
        self.0.freed.notify_one();
    }
}

pub struct LimitProcessor {
    inner: Arc<dyn Processor>,
    gate: Semaphore,
}

impl LimitProcessor {
    pub fn new(limit: usize, inner: Arc<dyn Processor>) -> Self {
        Self {
            inner,
            gate: Semaphore::new(limit),
        }
    }
}

impl Processor for LimitProcessor {
    fn process(
        &self,
        buf: PixelBuffer,
        params: &Params,
        cancel: &CancelToken,
    ) -> Result<PixelBuffer> {
        let _permit = self.gate.acquire();
        cancel.check()?;
        self.inner.process(buf, params, cancel)
    }

    fn change(&self, params: &Params) -> bool {
        self.inner.change(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ProcessorFunc;
    use crate::pixel::Color;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn at_most_n_run_and_the_rest_wait() {
        const LIMIT: usize = 2;
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());
        let slow = ProcessorFunc::new(
            move |buf: PixelBuffer, _: &Params, _: &CancelToken| -> Result<PixelBuffer> {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(buf)
            },
        );
        let gate = Arc::new(LimitProcessor::new(LIMIT, Arc::new(slow)));

        let handles: Vec<_> = (0..LIMIT + 1)
            .map(|_| {
                let gate = gate.clone();
                thread::spawn(move || {
                    gate.process(
                        PixelBuffer::Uniform(Color::BLACK),
                        &Params::new(),
                        &CancelToken::new(),
                    )
                })
            })
            .collect();
        for h in handles {
            // The extra caller waits instead of failing.
            assert!(h.join().unwrap().is_ok());
        }
        assert_eq!(peak.load(Ordering::SeqCst), LIMIT);
        assert_eq!(gate.gate.available(), LIMIT);
    }

    #[test]
    fn permit_released_on_error() {
        let failing = ProcessorFunc::new(
            |_: PixelBuffer, _: &Params, _: &CancelToken| -> Result<PixelBuffer> {
                Err(crate::error::Error::Internal("boom".into()))
            },
        );
        let gate = LimitProcessor::new(1, Arc::new(failing));
        for _ in 0..3 {
            assert!(gate
                .process(PixelBuffer::Uniform(Color::BLACK), &Params::new(), &CancelToken::new())
                .is_err());
        }
        assert_eq!(gate.gate.available(), 1);
    }

    #[test]
    fn change_delegates() {
        let inner = ProcessorFunc::new(
            |b: PixelBuffer, _: &Params, _: &CancelToken| -> Result<PixelBuffer> { Ok(b) },
        )
        .with_change(|p: &Params| p.has("w"));
        let gate = LimitProcessor::new(1, Arc::new(inner));
        assert!(gate.change(&Params::new().with("w", 1)));
        assert!(!gate.change(&Params::new()));
    }
}
