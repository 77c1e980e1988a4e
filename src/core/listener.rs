//! Listener registration and subscription handles.

use std::sync::{Arc, Weak};

/// Boxed listener invoked with `(next, prev)` after each commit.
pub(crate) type ListenerFn<S> = Arc<dyn Fn(&S, &S) + Send + Sync>;

/// Anything listeners can be removed from.
pub(crate) trait Registry: Send + Sync {
    fn remove_listener(&self, id: u64) -> bool;
}

/// Handle to a registered listener.
///
/// The listener stays registered for as long as the handle lives. Dropping
/// the handle, or calling [`Subscription::unsubscribe`], removes it.
#[must_use = "dropping a Subscription unsubscribes the listener immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Registry>,
}

impl Subscription {
    pub(crate) fn new(id: u64, registry: Weak<dyn Registry>) -> Self {
        Self { id, registry }
    }

    /// Identifier of the listener, unique within its store.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_listener(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Wrap a slice listener so it only fires when the selected slice changes.
pub(crate) fn gated<S, T, Sel, Eq, L>(selector: Sel, equality: Eq, listener: L) -> ListenerFn<S>
where
    S: 'static,
    T: 'static,
    Sel: Fn(&S) -> T + Send + Sync + 'static,
    Eq: Fn(&T, &T) -> bool + Send + Sync + 'static,
    L: Fn(&T, &T) + Send + Sync + 'static,
{
    Arc::new(move |next: &S, prev: &S| {
        let selected = selector(next);
        let previous = selector(prev);
        if !equality(&selected, &previous) {
            listener(&selected, &previous);
        }
    })
}
