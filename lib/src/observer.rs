// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Observer list with subscription handles

use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Callback<S> = Arc<dyn Fn(&S) + Send + Sync>;

struct Inner<S> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<S>)>,
}

/// Observer list, notifying registered callbacks of new values
pub struct Observers<S> {
    inner: Arc<Mutex<Inner<S>>>,
}

impl<S: 'static> Default for Observers<S> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                callbacks: vec![],
            })),
        }
    }
}

impl<S: 'static> Observers<S> {
    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a callback, removed when the returned [Subscription] is dropped
    pub fn subscribe(&self, f: impl Fn(&S) + Send + Sync + 'static) -> Subscription {
        let mut inner = self.lock();

        let id = inner.next_id;
        inner.next_id += 1;
        inner.callbacks.push((id, Arc::new(f)));

        let weak: Weak<Mutex<Inner<S>>> = Arc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(i) = weak.upgrade() {
                    let mut i = i.lock().unwrap_or_else(|e| e.into_inner());
                    i.callbacks.retain(|(n, _)| *n != id);
                }
            })),
        }
    }

    /// Notify all registered callbacks
    ///
    /// Callbacks are invoked outside the observer lock, so may subscribe or
    /// unsubscribe.
    pub fn notify(&self, value: &S) {
        let callbacks: Vec<_> = self.lock().callbacks.iter().map(|(_, f)| f.clone()).collect();

        for f in callbacks {
            f(value);
        }
    }

    /// Remove all registered callbacks
    pub fn clear(&self) {
        self.lock().callbacks.clear();
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.lock().callbacks.len()
    }

    /// Check whether any callbacks are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Subscription handle, unsubscribes on drop
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Explicitly unsubscribe
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
