use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use soulshare_contracts::state_monitor::{StateMonitor, Subscription};

type Listener<T> = Box<dyn Fn(&T, &T) + Send + Sync>;

struct Inner<T> {
    value: Mutex<T>,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_id: Mutex<u64>,
}

/// A lock-serialized observable cell implementing [`StateMonitor`].
/// `set_value` applies the setter under the lock and publishes
/// `(previous, current)` to every subscriber synchronously, before the
/// lock is released.
pub struct ManagedState<T> {
    inner: Arc<Inner<T>>,
}

impl<T> fmt::Debug for ManagedState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedState")
            .field("listener_count", &self.inner.listeners.lock().len())
            .finish()
    }
}

impl<T> Clone for ManagedState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ManagedState<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(initial),
                listeners: Mutex::new(Vec::new()),
                next_id: Mutex::new(0),
            }),
        }
    }
}

impl<T> StateMonitor<T> for ManagedState<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn current_value(&self) -> T {
        self.inner.value.lock().clone()
    }

    fn set_value(&self, setter: Box<dyn FnOnce(&T) -> T + Send>) -> T {
        let (previous, current) = {
            let mut guard = self.inner.value.lock();
            let previous = guard.clone();
            let current = setter(&previous);
            *guard = current.clone();
            (previous, current)
        };

        if previous != current {
            for (_, listener) in self.inner.listeners.lock().iter() {
                listener(&previous, &current);
            }
        }
        current
    }

    fn on_change(&self, listener: Box<dyn Fn(&T, &T) + Send + Sync>) -> Subscription {
        let id = {
            let mut next_id = self.inner.next_id.lock();
            let id = *next_id;
            *next_id += 1;
            id
        };
        self.inner.listeners.lock().push((id, listener));

        let inner = self.inner.clone();
        Subscription::new(move || {
            inner.listeners.lock().retain(|(lid, _)| *lid != id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn set_value_applies_setter_and_returns_current() {
        let state = ManagedState::new(1i32);
        let next = state.set_value(Box::new(|prev| prev + 1));
        assert_eq!(next, 2);
        assert_eq!(state.current_value(), 2);
    }

    #[test]
    fn on_change_fires_synchronously_with_previous_and_current() {
        let state = ManagedState::new(0i32);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let last_seen = Arc::new(Mutex::new((0, 0)));
        let last_seen2 = last_seen.clone();
        let _sub = state.on_change(Box::new(move |prev, cur| {
            calls2.fetch_add(1, Ordering::Relaxed);
            *last_seen2.lock() = (*prev, *cur);
        }));

        state.set_value(Box::new(|_| 5));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(*last_seen.lock(), (0, 5));
    }

    #[test]
    fn no_change_does_not_notify() {
        let state = ManagedState::new(7i32);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let _sub = state.on_change(Box::new(move |_, _| {
            calls2.fetch_add(1, Ordering::Relaxed);
        }));
        state.set_value(Box::new(|prev| *prev));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn disposing_subscription_unsubscribes() {
        let state = ManagedState::new(0i32);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let sub = state.on_change(Box::new(move |_, _| {
            calls2.fetch_add(1, Ordering::Relaxed);
        }));
        drop(sub);
        state.set_value(Box::new(|_| 1));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn previous_value_is_a_snapshot_not_a_live_reference() {
        let state = ManagedState::new(vec![1, 2, 3]);
        let seen_prev = Arc::new(Mutex::new(Vec::new()));
        let seen_prev2 = seen_prev.clone();
        let _sub = state.on_change(Box::new(move |prev, _cur| {
            *seen_prev2.lock() = prev.clone();
        }));
        state.set_value(Box::new(|prev| {
            let mut next = prev.clone();
            next.push(4);
            next
        }));
        assert_eq!(*seen_prev.lock(), vec![1, 2, 3]);
        assert_eq!(state.current_value(), vec![1, 2, 3, 4]);
    }
}
