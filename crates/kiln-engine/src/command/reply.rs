use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Single-value result slot written by the render thread.
///
/// The producer reads it only after `wait_for_idle` on the buffer that carried
/// the record; that wait is the happens-before edge for the value.
pub struct ReplySlot<T> {
    inner: Arc<Mutex<Option<T>>>,
}

impl<T> ReplySlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set(&self, value: T) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    pub fn take(&self) -> Option<T> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_set(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T> Clone for ReplySlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ReplySlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ReplySlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplySlot")
            .field("set", &self.is_set())
            .finish()
    }
}

/// Wakes an external waiter once every earlier record has executed.
#[derive(Clone, Default)]
pub struct CompletionSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        let (flag, cond) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cond.notify_all();
    }

    pub fn is_signaled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until signaled.
    pub fn wait(&self) {
        let (flag, cond) = &*self.inner;
        let mut done = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = cond.wait(done).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until signaled or `timeout` passes. Returns whether it was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cond) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (done, _) = cond
            .wait_timeout_while(guard, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *done
    }
}

impl fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}
