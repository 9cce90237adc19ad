//! Ordered subscriber lists.
//!
//! [`Event`] is a plain multicast list: every emit reaches every subscriber in
//! subscription order. [`OneShot`] fires at most once; after it fires it is
//! `Consumed` and further subscriptions are rejected instead of being silently
//! dropped.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

/// Errors from one-shot event handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The event already fired.
    #[error("event '{0}' has already fired")]
    Consumed(&'static str),
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;
type OnceListener<T> = Box<dyn FnOnce(&T) + Send>;

/// A multicast event with an ordered subscriber list.
pub struct Event<T> {
    listeners: Mutex<Vec<Listener<T>>>,
}

impl<T> Event<T> {
    /// Create an event with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Append a subscriber.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Invoke every subscriber in order.
    ///
    /// The list is snapshotted first so a subscriber may subscribe again
    /// without deadlocking; late subscribers see the next emit.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in snapshot {
            listener(value);
        }
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("listeners", &self.len())
            .finish()
    }
}

enum OneShotState<T> {
    Open(Vec<OnceListener<T>>),
    Consumed,
}

/// A fire-once event with an `Open -> Consumed` lifecycle.
pub struct OneShot<T> {
    name: &'static str,
    state: Mutex<OneShotState<T>>,
}

impl<T> OneShot<T> {
    /// Create an open one-shot event. `name` appears in errors.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(OneShotState::Open(Vec::new())),
        }
    }

    /// Append a subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Consumed`] if the event already fired.
    pub fn subscribe(&self, listener: impl FnOnce(&T) + Send + 'static) -> Result<(), EventError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *state {
            OneShotState::Open(listeners) => {
                listeners.push(Box::new(listener));
                Ok(())
            },
            OneShotState::Consumed => Err(EventError::Consumed(self.name)),
        }
    }

    /// Fire the event, consuming every subscriber in order.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Consumed`] if the event already fired.
    pub fn fire(&self, value: &T) -> Result<(), EventError> {
        let listeners = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *state, OneShotState::Consumed) {
                OneShotState::Open(listeners) => listeners,
                OneShotState::Consumed => return Err(EventError::Consumed(self.name)),
            }
        };
        for listener in listeners {
            listener(value);
        }
        Ok(())
    }

    /// Whether the event has fired.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            OneShotState::Consumed
        )
    }
}

impl<T> std::fmt::Debug for OneShot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneShot")
            .field("name", &self.name)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn event_reaches_subscribers_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let event = Event::<u32>::new();
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            event.subscribe(move |v| seen.lock().unwrap().push(format!("{tag}:{v}")));
        }
        event.emit(&7);
        event.emit(&8);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:7", "second:7", "first:8", "second:8"]
        );
    }

    #[test]
    fn one_shot_fires_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let event = OneShot::<()>::new("deleted");
        let h = Arc::clone(&hits);
        event
            .subscribe(move |()| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        event.fire(&()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(event.is_consumed());
        assert_eq!(event.fire(&()), Err(EventError::Consumed("deleted")));
    }

    #[test]
    fn one_shot_rejects_late_subscribers() {
        let event = OneShot::<()>::new("stage");
        event.fire(&()).unwrap();
        let err = event.subscribe(|()| {}).unwrap_err();
        assert_eq!(err, EventError::Consumed("stage"));
    }
}
