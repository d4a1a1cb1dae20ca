//! Debounced side effects.
//!
//! A [`Debouncer`] collapses bursts of calls into one invocation of its
//! sink after a quiet period. The pending value is never lost: dropping the
//! debouncer flushes it synchronously.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A scoped timer that delivers the latest value after `delay` of quiet.
pub struct Debouncer<T: Send + 'static> {
    delay: Duration,
    sink: Sink<T>,
    pending: Arc<Mutex<Option<T>>>,
    timer: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(delay: Duration, sink: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            delay,
            sink: Arc::new(sink),
            pending: Arc::new(Mutex::new(None)),
            timer: None,
        }
    }

    /// Schedule `value`, replacing any pending one and restarting the timer.
    ///
    /// Outside a tokio runtime there is no timer to run, so the value is
    /// delivered immediately.
    pub fn call(&mut self, value: T) {
        self.stop_timer();
        let Ok(runtime) = Handle::try_current() else {
            (self.sink)(value);
            return;
        };
        *lock(&self.pending) = Some(value);

        let pending = Arc::clone(&self.pending);
        let sink = Arc::clone(&self.sink);
        let delay = self.delay;
        self.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let value = lock(&pending).take();
            if let Some(value) = value {
                sink(value);
            }
        }));
    }

    /// Deliver the pending value now, if any.
    pub fn flush(&mut self) {
        self.stop_timer();
        let value = lock(&self.pending).take();
        if let Some(value) = value {
            (self.sink)(value);
        }
    }

    /// Drop the pending value without delivering it.
    pub fn cancel(&mut self) {
        self.stop_timer();
        lock(&self.pending).take();
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.pending).is_some()
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.flush();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
