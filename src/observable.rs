//! Observable state container shared between the stores/controllers and the
//! view layer.
//!
//! Every subscriber receives the value current at subscription time first and
//! then every later write, in write order. Writes never block on slow
//! subscribers; dropped subscriptions are pruned on the next write.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

struct Inner<T> {
    value: T,
    subscribers: Vec<mpsc::UnboundedSender<T>>,
}

/// Cheaply cloneable handle; clones observe and mutate the same value.
pub struct Observable<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value,
                subscribers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // No closure passed to `update` can leave the value half-written in a
        // way later readers care about, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Read a projection of the current value without cloning all of it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock().value)
    }

    pub fn set(&self, value: T) {
        self.update(|v| *v = value);
    }

    /// Mutate the value in place and notify subscribers.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.update_if(|v| (true, f(v)))
    }

    /// Mutate the value in place; subscribers are notified only when `f`
    /// reports a change. Freshness checks that must be atomic with the write
    /// they guard go through here.
    pub fn update_if<R>(&self, f: impl FnOnce(&mut T) -> (bool, R)) -> R {
        let mut guard = self.lock();
        let (changed, out) = f(&mut guard.value);
        if changed {
            let snapshot = guard.value.clone();
            guard
                .subscribers
                .retain(|tx| tx.send(snapshot.clone()).is_ok());
        }
        out
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.lock();
        // Receiver is alive, so this cannot fail.
        let _ = tx.send(guard.value.clone());
        guard.subscribers.push(tx);
        Subscription { rx }
    }

    pub fn subscriber_count(&self) -> usize {
        let mut guard = self.lock();
        guard.subscribers.retain(|tx| !tx.is_closed());
        guard.subscribers.len()
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Observable").field(&self.lock().value).finish()
    }
}

/// Ordered stream of values written to an [`Observable`].
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Next value in write order; `None` once every handle to the observable
    /// has been dropped and the backlog is drained.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Skip values until one satisfies `pred`.
    pub async fn wait_for(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        while let Some(value) = self.rx.recv().await {
            if pred(&value) {
                return Some(value);
            }
        }
        None
    }

    /// Drain everything already delivered without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(v) = self.rx.try_recv() {
            out.push(v);
        }
        out
    }
}
