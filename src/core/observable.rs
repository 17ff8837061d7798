//! A value that observers can subscribe to.
//!
//! Every change is delivered to every registered observer, in the order the
//! changes happened and in the order the observers registered. Delivery is
//! synchronous on the emitting task. Changes made while a delivery is already
//! running (from inside an observer, or from another thread) are queued and
//! drained by the delivering caller, so observers never see states out of
//! order and are never re-entered.

use futures_util::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    /// Sequence number of the last change this observer already knows about.
    since: u64,
    observer: Observer<T>,
}

struct Delivery<T> {
    seq: u64,
    value: T,
    /// `Some` for the initial value sent to a fresh subscriber only.
    target: Option<u64>,
}

impl<T> Delivery<T> {
    fn reaches(&self, entry: &Entry<T>) -> bool {
        match self.target {
            Some(id) => entry.id == id,
            None => entry.since < self.seq,
        }
    }
}

struct Registry<T> {
    value: T,
    seq: u64,
    next_id: u64,
    observers: Vec<Entry<T>>,
    queue: VecDeque<Delivery<T>>,
    delivering: bool,
}

/// Writable observable value. Cloning yields another handle to the same value.
pub struct Observable<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                value,
                seq: 0,
                next_id: 0,
                observers: Vec::new(),
                queue: VecDeque::new(),
                delivering: false,
            })),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    pub fn set(&self, value: T) {
        self.update(|_| Some(value));
    }

    /// Computes the next value from the current one under the lock.
    ///
    /// Returning `None` leaves the value alone and notifies nobody. Returns
    /// whether a change was made.
    pub fn update(&self, f: impl FnOnce(&T) -> Option<T>) -> bool {
        let mut registry = self.lock();
        let Some(next) = f(&registry.value) else {
            return false;
        };

        registry.seq += 1;
        registry.value = next.clone();
        let seq = registry.seq;
        registry.queue.push_back(Delivery {
            seq,
            value: next,
            target: None,
        });
        self.drain(registry);
        true
    }

    /// Registers `observer`. It is called with the current value, then with
    /// every later change until the returned [`Subscription`] is dropped.
    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;

        let since = registry.seq;
        let current = registry.value.clone();
        registry.observers.push(Entry {
            id,
            since,
            observer: Arc::new(observer),
        });
        registry.queue.push_back(Delivery {
            seq: since,
            value: current,
            target: Some(id),
        });
        self.drain(registry);

        let registry = Arc::downgrade(&self.registry);
        Subscription::new(move || remove(&registry, id))
    }

    /// Subscribes through a channel. The stream yields the current value first.
    pub fn stream(&self) -> StateStream<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |value: &T| {
            // A closed receiver means the stream is being torn down.
            let _ = sender.send(value.clone());
        });
        StateStream::new(receiver, subscription)
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Registry<T>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drain<'a>(&'a self, mut registry: MutexGuard<'a, Registry<T>>) {
        if registry.delivering {
            return;
        }
        registry.delivering = true;
        let _unwind = DeliveryReset {
            registry: &self.registry,
        };

        while let Some(delivery) = registry.queue.pop_front() {
            let ids: Vec<u64> = registry
                .observers
                .iter()
                .filter(|entry| delivery.reaches(entry))
                .map(|entry| entry.id)
                .collect();

            for id in ids {
                // Re-check: an earlier observer may have unsubscribed this one.
                let Some(observer) = registry
                    .observers
                    .iter()
                    .find(|entry| entry.id == id)
                    .map(|entry| entry.observer.clone())
                else {
                    continue;
                };

                drop(registry);
                observer(&delivery.value);
                registry = self.lock();
            }
        }

        registry.delivering = false;
    }
}

/// Clears the delivering flag when an observer panics mid-drain, so the
/// next change drains whatever is still queued.
struct DeliveryReset<'a, T> {
    registry: &'a Mutex<Registry<T>>,
}

impl<T> Drop for DeliveryReset<'_, T> {
    fn drop(&mut self) {
        // On the normal path the drain loop clears the flag under its own lock.
        if std::thread::panicking() {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.delivering = false;
        }
    }
}

fn remove<T>(registry: &Weak<Mutex<Registry<T>>>, id: u64) {
    if let Some(registry) = registry.upgrade() {
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.observers.retain(|entry| entry.id != id);
    }
}

/// Deregistration handle returned by `subscribe`. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Async view of an observable. Holds its subscription alive.
pub struct StateStream<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    _subscription: Subscription,
}

impl<T> StateStream<T> {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<T>, subscription: Subscription) -> Self {
        Self {
            receiver,
            _subscription: subscription,
        }
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

impl<T> Stream for StateStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.receiver.poll_recv(cx)
    }
}
