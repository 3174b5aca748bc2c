//! One-shot value cell used to break construction cycles.
//!
//! Projects needs to reach Services and ManagedServices after the whole
//! core aggregate exists; subscribing to the promise at construction time
//! and resolving it once wiring finishes avoids a constructor cycle. Not
//! part of the runtime data plane.

use std::sync::{Arc, Mutex};

type Subscriber<T> = Box<dyn FnOnce(&T) + Send>;

struct PromiseState<T> {
    value: Option<T>,
    subscribers: Vec<Subscriber<T>>,
}

pub struct Promise<T> {
    state: Arc<Mutex<PromiseState<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise { state: Arc::clone(&self.state) }
    }
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Promise {
            state: Arc::new(Mutex::new(PromiseState {
                value: None,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Deliver the value; must be called at most once. Queued subscribers
    /// run synchronously before this returns.
    pub fn resolve(&self, value: T) {
        let mut state = self.state.lock().expect("promise lock poisoned");
        debug_assert!(state.value.is_none(), "promise resolved twice");
        let subscribers = std::mem::take(&mut state.subscribers);
        state.value = Some(value);
        let value_ref = state.value.as_ref().expect("value just set");
        for subscriber in subscribers {
            subscriber(value_ref);
        }
    }

    /// Run `f` with the value: immediately when already resolved,
    /// otherwise when `resolve` is called.
    pub fn on_resolved<F>(&self, f: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let mut state = self.state.lock().expect("promise lock poisoned");
        match &state.value {
            Some(value) => f(value),
            None => state.subscribers.push(Box::new(f)),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn subscriber_before_resolve_runs_on_resolve() {
        let promise: Promise<u32> = Promise::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        promise.on_resolved(move |v| {
            assert_eq!(*v, 7);
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        promise.resolve(7);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_after_resolve_runs_immediately() {
        let promise: Promise<&'static str> = Promise::new();
        promise.resolve("ready");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        promise.on_resolved(move |v| {
            assert_eq!(*v, "ready");
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn many_subscribers_all_run() {
        let promise: Promise<u8> = Promise::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let h = Arc::clone(&hits);
            promise.on_resolved(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            });
        }
        promise.resolve(1);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }
}
