//! The observable state container every middleware wraps.

use super::error::StoreError;
use super::listener::{gated, ListenerFn, Registry, Subscription};
use super::state::{Fields, State};
use super::transition::{Origin, Transition, Update};
use crate::config::StoreConfig;
use crate::middleware::{BuildError, Middleware, StoreBuilder};
use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{
    Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};
use std::thread::{self, ThreadId};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Updates waiting for the current notification pass to finish.
///
/// Only the draining thread queues into `pending`; other threads wait on
/// `idle` until the drain ends and then run their own.
struct Dispatch<S> {
    owner: Option<ThreadId>,
    pending: VecDeque<(Origin, Update<S>)>,
}

struct Inner<S: State> {
    state: RwLock<Arc<S>>,
    listeners: RwLock<Vec<(u64, ListenerFn<S>)>>,
    dispatch: Mutex<Dispatch<S>>,
    idle: Condvar,
    middleware: Vec<Box<dyn Middleware<S>>>,
    next_listener: AtomicU64,
    max_nested_updates: usize,
}

impl<S: State> Registry for Inner<S> {
    fn remove_listener(&self, id: u64) -> bool {
        let mut listeners = write(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }
}

/// Releases the drain when it ends, including by panic, and wakes
/// waiting threads.
struct DrainGuard<'a, S: State>(&'a Inner<S>);

impl<S: State> Drop for DrainGuard<'_, S> {
    fn drop(&mut self) {
        {
            let mut dispatch = lock(&self.0.dispatch);
            dispatch.owner = None;
            // only nested updates of the unwinding thread can be left here
            dispatch.pending.clear();
        }
        self.0.idle.notify_all();
    }
}

/// A thread-safe observable state container.
///
/// Cloning a `Store` is cheap and every clone shares the same state,
/// listeners and middleware.
///
/// Transitions are applied one at a time. An update requested from inside
/// a listener is queued and applied after the current pass completes,
/// with its own notification pass. An update from another thread waits
/// until the running drain has finished and then applies, so its result
/// is its own. A listener must therefore not block on another thread that
/// updates the same store.
///
/// # Example
///
/// ```rust
/// use holdfast::Store;
/// use serde::{Deserialize, Serialize};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
/// struct Counter {
///     count: i64,
/// }
///
/// let store = Store::new(Counter { count: 0 });
/// let calls = Arc::new(AtomicUsize::new(0));
///
/// let seen = Arc::clone(&calls);
/// let _subscription = store.subscribe(move |_next, _prev| {
///     seen.fetch_add(1, Ordering::SeqCst);
/// });
///
/// store.update(|c| Counter { count: c.count + 1 }).unwrap();
/// store.update(|c| c.clone()).unwrap(); // no-op, no notification
///
/// assert_eq!(store.get_state().count, 1);
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// ```
pub struct Store<S: State> {
    inner: Arc<Inner<S>>,
}

impl<S: State> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: State> Store<S> {
    /// Create a store with no middleware.
    pub fn new(initial: S) -> Self {
        Self::assemble(initial, &StoreConfig::default(), Vec::new())
    }

    /// Start composing a store with middleware.
    pub fn builder(initial: S) -> StoreBuilder<S> {
        StoreBuilder::new(initial)
    }

    pub(crate) fn assemble(
        initial: S,
        config: &StoreConfig,
        middleware: Vec<Box<dyn Middleware<S>>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(Arc::new(initial)),
                listeners: RwLock::new(Vec::new()),
                dispatch: Mutex::new(Dispatch {
                    owner: None,
                    pending: VecDeque::new(),
                }),
                idle: Condvar::new(),
                middleware,
                next_listener: AtomicU64::new(0),
                max_nested_updates: config.max_nested_updates,
            }),
        }
    }

    pub(crate) fn attach_middleware(&self) -> Result<(), BuildError> {
        for layer in &self.inner.middleware {
            layer.attach(self)?;
        }
        Ok(())
    }

    /// Current state. Never has side effects.
    pub fn get_state(&self) -> Arc<S> {
        Arc::clone(&read(&self.inner.state))
    }

    /// Apply an update.
    ///
    /// Returns an error if a partial update does not merge into a valid
    /// state, or if listeners scheduled more nested updates than the
    /// configured limit. A rejected update leaves the state unchanged.
    pub fn set_state(&self, update: Update<S>) -> Result<(), StoreError> {
        self.set_with(Origin::Set, update)
    }

    /// Replace the state with a value computed from the previous one.
    pub fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&S) -> S + Send + 'static,
    {
        self.set_state(Update::compute(f))
    }

    /// Shallow-merge a partial record computed from the previous state.
    pub fn patch<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&S) -> Fields + Send + 'static,
    {
        self.set_state(Update::compute_partial(f))
    }

    /// Shallow-merge a partial record over the current state.
    pub fn merge(&self, partial: Fields) -> Result<(), StoreError> {
        self.set_state(Update::Merge(partial))
    }

    /// Replace the whole state.
    pub fn replace(&self, next: S) -> Result<(), StoreError> {
        self.set_state(Update::Replace(next))
    }

    /// Apply an update labelled with an action name.
    ///
    /// Behaves like [`Store::set_state`]; the label travels with the
    /// transition so middleware can report it.
    pub fn dispatch(
        &self,
        action: impl Into<Cow<'static, str>>,
        update: Update<S>,
    ) -> Result<(), StoreError> {
        self.set_with(Origin::Action(action.into()), update)
    }

    pub(crate) fn set_with(&self, origin: Origin, update: Update<S>) -> Result<(), StoreError> {
        let me = thread::current().id();
        {
            let mut dispatch = lock(&self.inner.dispatch);
            if dispatch.owner == Some(me) {
                dispatch.pending.push_back((origin, update));
                return Ok(());
            }
            while dispatch.owner.is_some() {
                dispatch = self
                    .inner
                    .idle
                    .wait(dispatch)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            dispatch.owner = Some(me);
        }
        self.drain(origin, update)
    }

    /// Apply `first`, then every update its listeners queued.
    ///
    /// Only the queued updates count against `max_nested_updates`. Errors
    /// of nested updates are logged and the first one is returned.
    fn drain(&self, origin: Origin, update: Update<S>) -> Result<(), StoreError> {
        let _guard = DrainGuard(&self.inner);
        let limit = self.inner.max_nested_updates;
        let mut first_error = self.apply(origin, update).err();
        let mut nested = 0usize;

        loop {
            let next = lock(&self.inner.dispatch).pending.pop_front();
            let Some((origin, update)) = next else {
                break;
            };

            nested += 1;
            if nested > limit {
                let discarded = {
                    let mut dispatch = lock(&self.inner.dispatch);
                    let discarded = dispatch.pending.len() + 1;
                    dispatch.pending.clear();
                    discarded
                };
                tracing::error!(
                    limit,
                    discarded,
                    "listeners kept scheduling updates; discarding the queue"
                );
                return Err(StoreError::ReentrancyOverflow { limit });
            }

            if let Err(e) = self.apply(origin, update) {
                tracing::warn!(error = %e, "nested update rejected");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn apply(&self, origin: Origin, update: Update<S>) -> Result<bool, StoreError> {
        let prev = self.get_state();
        let proposed = update.resolve(&prev)?;
        let next = self
            .inner
            .middleware
            .iter()
            .fold(proposed, |next, layer| layer.prepare(&prev, next, &origin));

        if next == *prev {
            tracing::trace!(%origin, "no-op update skipped");
            return Ok(false);
        }

        let next = Arc::new(next);
        *write(&self.inner.state) = Arc::clone(&next);
        let transition = Transition { prev, next, origin };
        tracing::trace!(origin = %transition.origin, "transition committed");

        for layer in &self.inner.middleware {
            layer.committed(&transition);
        }
        self.notify(&transition);
        Ok(true)
    }

    fn notify(&self, transition: &Transition<S>) {
        let listeners: Vec<ListenerFn<S>> = read(&self.inner.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&transition.next, &transition.prev);
        }
    }

    /// Register a listener called with `(next, prev)` after every commit.
    pub fn subscribe<L>(&self, listener: L) -> Subscription
    where
        L: Fn(&S, &S) + Send + Sync + 'static,
    {
        self.register(Arc::new(listener))
    }

    /// Register a listener on a slice of the state.
    ///
    /// The listener receives `(selected, previous)` and only runs when the
    /// selected slice changes according to `PartialEq`.
    pub fn subscribe_with_selector<T, Sel, L>(&self, selector: Sel, listener: L) -> Subscription
    where
        T: PartialEq + 'static,
        Sel: Fn(&S) -> T + Send + Sync + 'static,
        L: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.register(gated(selector, |a: &T, b: &T| a == b, listener))
    }

    /// Register a listener on a slice of the state with a custom equality.
    pub fn subscribe_with_equality<T, Sel, Eq, L>(
        &self,
        selector: Sel,
        equality: Eq,
        listener: L,
    ) -> Subscription
    where
        T: 'static,
        Sel: Fn(&S) -> T + Send + Sync + 'static,
        Eq: Fn(&T, &T) -> bool + Send + Sync + 'static,
        L: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.register(gated(selector, equality, listener))
    }

    fn register(&self, listener: ListenerFn<S>) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        write(&self.inner.listeners).push((id, listener));
        let weak: Weak<Inner<S>> = Arc::downgrade(&self.inner);
        let registry: Weak<dyn Registry> = weak;
        Subscription::new(id, registry)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        read(&self.inner.listeners).len()
    }

    /// Find a middleware layer by type.
    pub fn find<M: Middleware<S>>(&self) -> Option<&M> {
        self.inner
            .middleware
            .iter()
            .find_map(|layer| layer.as_any().downcast_ref::<M>())
    }

    /// Names of the middleware layers, innermost first.
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.inner.middleware.iter().map(|layer| layer.name()).collect()
    }

    /// Whether two handles refer to the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Non-owning handle that does not keep the store alive.
    pub fn downgrade(&self) -> WeakStore<S> {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<S: State> std::fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.get_state())
            .field("listeners", &self.listener_count())
            .field("middleware", &self.middleware_names())
            .finish()
    }
}

/// Non-owning store handle.
pub struct WeakStore<S: State> {
    inner: Weak<Inner<S>>,
}

impl<S: State> WeakStore<S> {
    /// The store, if it is still alive.
    pub fn upgrade(&self) -> Option<Store<S>> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl<S: State> Clone for WeakStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}
