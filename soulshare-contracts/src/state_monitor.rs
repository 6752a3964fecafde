/// Guard returned by [`StateMonitor::on_change`]; dropping it unsubscribes
/// the listener.
pub struct Subscription(Option<Box<dyn FnOnce() + Send>>);

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(unsubscribe)))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.0.take() {
            unsubscribe();
        }
    }
}

/// A lock-serialized observable cell of `T`.
///
/// `set_value` applies a setter under lock and publishes `(previous,
/// current)` to all subscribers synchronously, before the lock is
/// released. `T` must be cheaply, value-comparably cloneable — the
/// "previous" snapshot is a deep copy, not a reference.
pub trait StateMonitor<T>: Send + Sync
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Read the current value.
    fn current_value(&self) -> T;

    /// Apply `setter` to the current value under lock and publish the
    /// `(previous, current)` pair to subscribers. Returns the new value.
    fn set_value(&self, setter: Box<dyn FnOnce(&T) -> T + Send>) -> T;

    /// Subscribe to `(previous, current)` transitions.
    fn on_change(&self, listener: Box<dyn Fn(&T, &T) + Send + Sync>) -> Subscription;
}
