//! Event listener registry.
//!
//! Listeners are grouped by event kind and kept in registration order. A
//! listener is identified by the `Arc` it was registered with, so registering
//! the same `Arc` twice for the same kind is a no-op, and removal takes the
//! same `Arc` back.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Trait for events that can be dispatched through a [`ListenerRegistry`].
pub trait Event: Send + Sync + fmt::Debug {
    /// Discriminant used to route the event to listeners.
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync;

    /// Returns the kind of this event (e.g. `open`, `close`).
    fn kind(&self) -> Self::Kind;
}

/// Trait for listening to events.
pub trait EventListener<E: Event>: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &E);
}

/// Type alias for shared event listeners.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A simple function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Creates a new function-based listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: Event,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

/// Wraps a closure into a shareable listener handle.
///
/// Keep the returned `Arc` around if the listener needs to be removed later.
pub fn listener<E, F>(f: F) -> BoxedEventListener<E>
where
    E: Event + 'static,
    F: Fn(&E) + Send + Sync + 'static,
{
    Arc::new(FnListener::new(f))
}

/// Options attached to a single registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Remove the registration after its first delivery.
    pub once: bool,
}

impl ListenerOptions {
    /// Options for a listener that fires a single time.
    pub fn once() -> Self {
        Self { once: true }
    }
}

struct Registration<E: Event> {
    listener: BoxedEventListener<E>,
    options: ListenerOptions,
}

impl<E: Event> Clone for Registration<E> {
    fn clone(&self) -> Self {
        Self {
            listener: Arc::clone(&self.listener),
            options: self.options,
        }
    }
}

/// Returns true if both handles point at the same listener object.
pub fn same_listener<E: Event>(a: &BoxedEventListener<E>, b: &BoxedEventListener<E>) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units.
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Registered listeners, grouped by event kind.
pub struct ListenerRegistry<E: Event> {
    by_kind: HashMap<E::Kind, Vec<Registration<E>>>,
}

impl<E: Event> ListenerRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            by_kind: HashMap::new(),
        }
    }

    /// Registers `listener` for `kind`.
    ///
    /// Returns `false` if the same listener was already registered for this kind,
    /// in which case the existing registration (and its options) is kept.
    pub fn add(
        &mut self,
        kind: E::Kind,
        listener: BoxedEventListener<E>,
        options: ListenerOptions,
    ) -> bool {
        let entries = self.by_kind.entry(kind).or_default();
        if entries
            .iter()
            .any(|entry| same_listener(&entry.listener, &listener))
        {
            return false;
        }
        entries.push(Registration { listener, options });
        true
    }

    /// Removes every registration of `listener` for `kind`.
    ///
    /// Returns `true` if anything was removed.
    pub fn remove(&mut self, kind: E::Kind, listener: &BoxedEventListener<E>) -> bool {
        let Some(entries) = self.by_kind.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| !same_listener(&entry.listener, listener));
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.by_kind.remove(&kind);
        }
        removed
    }

    /// Returns true if `listener` is registered for `kind`.
    pub fn contains(&self, kind: E::Kind, listener: &BoxedEventListener<E>) -> bool {
        self.by_kind.get(&kind).is_some_and(|entries| {
            entries
                .iter()
                .any(|entry| same_listener(&entry.listener, listener))
        })
    }

    /// Takes a snapshot of the listeners that should receive the next event of `kind`.
    ///
    /// One-shot registrations are dropped from the registry as part of the snapshot,
    /// so they are delivered at most once even if the caller dispatches later.
    pub fn prepare_dispatch(&mut self, kind: E::Kind) -> Vec<BoxedEventListener<E>> {
        let Some(entries) = self.by_kind.get_mut(&kind) else {
            return Vec::new();
        };
        let snapshot = entries
            .iter()
            .map(|entry| Arc::clone(&entry.listener))
            .collect();
        entries.retain(|entry| !entry.options.once);
        if entries.is_empty() {
            self.by_kind.remove(&kind);
        }
        snapshot
    }

    /// Returns the number of listeners registered for `kind`.
    pub fn len_for(&self, kind: E::Kind) -> usize {
        self.by_kind.get(&kind).map_or(0, Vec::len)
    }

    /// Returns the total number of registrations.
    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    /// Returns true if there are no listeners.
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

impl<E: Event> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> Clone for ListenerRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            by_kind: self.by_kind.clone(),
        }
    }
}

impl<E: Event> fmt::Debug for ListenerRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (kind, entries) in &self.by_kind {
            map.entry(kind, &entries.len());
        }
        map.finish()
    }
}

/// Delivers `event` to each listener in order.
///
/// If a listener panics, the panic is caught and the remaining listeners
/// will still be called.
pub fn emit<E: Event>(listeners: &[BoxedEventListener<E>], event: &E) {
    for listener in listeners {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            listener.on_event(event);
        }));
    }
}
