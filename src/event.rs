//! Single-threaded observer lists and RAII subscription handles.
//!
//! An [`Emitter`] keeps callbacks in registration order. Emitting iterates a
//! snapshot of the list, so callbacks may subscribe or unsubscribe while a
//! notification is in flight without disturbing the current delivery.

use std::fmt;
use std::rc::Rc;

/// Identifies one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

type Callback<T> = Rc<dyn Fn(&T)>;

/// An ordered list of callbacks for events of type `T`.
pub struct Emitter<T> {
    next_id: u64,
    observers: Vec<(ObserverId, Callback<T>)>,
}

impl<T> Emitter<T> {
    pub const fn new() -> Self {
        Self {
            next_id: 0,
            observers: Vec::new(),
        }
    }

    /// Register `callback` and return its id.
    pub fn subscribe(&mut self, callback: impl Fn(&T) + 'static) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Rc::new(callback)));
        id
    }

    /// Remove the callback registered under `id`.
    ///
    /// Returns `false` if no such callback exists.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer, _)| *observer != id);
        self.observers.len() != before
    }

    /// The current callbacks, in registration order.
    ///
    /// Take the snapshot, release any borrow on the emitter, then invoke.
    pub fn snapshot(&self) -> Vec<Callback<T>> {
        self.observers
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect()
    }

    /// Invoke every callback with `event`.
    pub fn emit(&self, event: &T) {
        for callback in self.snapshot() {
            callback(event);
        }
    }

    pub const fn len(&self) -> usize {
        self.observers.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Cancellation handle returned by `observe` methods.
///
/// Dropping the handle cancels the subscription. Use [`Subscription::detach`]
/// to keep the callback registered for the lifetime of its source.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    id: ObserverId,
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(id: ObserverId, cancel: impl FnOnce() + 'static) -> Self {
        Self {
            id,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub const fn id(&self) -> ObserverId {
        self.id
    }

    /// Cancel now. Equivalent to dropping the handle.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Give up the handle without cancelling; returns the observer id.
    pub fn detach(mut self) -> ObserverId {
        self.cancel = None;
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
