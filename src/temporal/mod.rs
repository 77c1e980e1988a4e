//! Bounded undo/redo history for a store.
//!
//! The [`Temporal`] middleware records the pre-transition state of every
//! tracked change. Its history is published through a facet store,
//! reachable with [`Store::temporal`], that can be read and subscribed to
//! independently of the main store.

mod history;

pub use history::{Snapshot, TemporalState};

use crate::config::{TemporalConfig, DEFAULT_MAX_DEPTH};
use crate::core::store::lock;
use crate::core::{
    merge_fields, omit, to_fields, Origin, State, Store, StoreError, Subscription, Transition,
    Update, WeakStore,
};
use crate::middleware::{BuildError, ConfigCheck, ConfigError, Middleware};
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use stillwater::validation::Validation;

/// Custom comparison deciding whether a transition is worth recording.
pub type Equality<S> = Arc<dyn Fn(&S, &S) -> bool + Send + Sync>;

/// Settings for [`Temporal`].
pub struct TemporalOptions<S> {
    max_depth: usize,
    exclude: BTreeSet<String>,
    equality: Option<Equality<S>>,
}

impl<S: State> Default for TemporalOptions<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State> TemporalOptions<S> {
    /// Depth 100, nothing excluded, record-level equality.
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            exclude: BTreeSet::new(),
            equality: None,
        }
    }

    /// Options seeded from serialized settings.
    pub fn from_config(config: &TemporalConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            exclude: config.exclude.clone(),
            equality: None,
        }
    }

    /// Maximum number of past snapshots (at least 1).
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Fields ignored when deciding whether to record, and kept at their
    /// current value when a snapshot is restored.
    pub fn exclude<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.exclude.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Replace the default comparison. Returning `true` means "unchanged,
    /// do not record".
    pub fn equality<F>(mut self, equality: F) -> Self
    where
        F: Fn(&S, &S) -> bool + Send + Sync + 'static,
    {
        self.equality = Some(Arc::new(equality));
        self
    }
}

#[derive(Clone, Copy, Debug)]
enum Direction {
    Back,
    Forward,
}

struct Shared<S: State> {
    max_depth: usize,
    exclude: BTreeSet<String>,
    equality: Option<Equality<S>>,
    history: Mutex<TemporalState<S>>,
    facet: Store<TemporalState<S>>,
    tracking: AtomicBool,
    target: OnceLock<WeakStore<S>>,
}

impl<S: State> Shared<S> {
    fn unchanged(&self, prev: &S, next: &S) -> bool {
        if let Some(equality) = &self.equality {
            return equality(prev, next);
        }
        if self.exclude.is_empty() {
            return prev == next;
        }
        match (to_fields(prev), to_fields(next)) {
            (Ok(prev), Ok(next)) => omit(&prev, &self.exclude) == omit(&next, &self.exclude),
            _ => prev == next,
        }
    }

    /// Apply a history change and publish the result to the facet.
    fn modify<R, F>(&self, change: F) -> Option<R>
    where
        F: FnOnce(&TemporalState<S>) -> Option<(TemporalState<S>, R)>,
    {
        let (published, result) = {
            let mut history = lock(&self.history);
            let (next, result) = change(&history)?;
            *history = next.clone();
            (next, result)
        };
        if let Err(e) = self.facet.replace(published) {
            tracing::warn!(error = %e, "history facet rejected update");
        }
        Some(result)
    }

    /// State an undo/redo step restores, without touching the stacks.
    ///
    /// The stacks move in `committed` once the replay is installed. A
    /// replay that restores the current state commits nothing, so its
    /// stacks move here instead.
    fn replay_target(&self, direction: Direction, current: &S) -> S {
        let target = {
            let history = lock(&self.history);
            match direction {
                Direction::Back => history.past().last().cloned(),
                Direction::Forward => history.future().last().cloned(),
            }
        };
        let Some(target) = target else {
            return current.clone();
        };
        let restored = self.restore(current, &target.state);
        if restored == *current {
            self.advance(direction, Arc::new(current.clone()));
        }
        restored
    }

    /// Move one step through history, parking `current` on the other stack.
    fn advance(&self, direction: Direction, current: Arc<S>) {
        let snapshot = Snapshot::capture(current);
        let max_depth = self.max_depth;
        self.modify(|history| {
            let step = match direction {
                Direction::Back => history.step_back(snapshot),
                Direction::Forward => history.step_forward(snapshot, max_depth),
            };
            step.map(|(next, _)| (next, ()))
        });
    }

    /// The snapshot's tracked fields over the current excluded fields.
    fn restore(&self, current: &S, target: &S) -> S {
        if self.exclude.is_empty() {
            return target.clone();
        }
        let restored = to_fields(target)
            .map(|fields| omit(&fields, &self.exclude))
            .and_then(|tracked| merge_fields(current, tracked));
        match restored {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "could not keep excluded fields; restoring full snapshot");
                target.clone()
            }
        }
    }
}

/// Undo/redo middleware.
pub struct Temporal<S: State> {
    shared: Arc<Shared<S>>,
}

impl<S: State> Temporal<S> {
    pub fn new(options: TemporalOptions<S>) -> Self {
        Self {
            shared: Arc::new(Shared {
                max_depth: options.max_depth,
                exclude: options.exclude,
                equality: options.equality,
                history: Mutex::new(TemporalState::new()),
                facet: Store::new(TemporalState::new()),
                tracking: AtomicBool::new(true),
                target: OnceLock::new(),
            }),
        }
    }

    /// Consumer handle for this layer's history.
    pub fn handle(&self) -> TemporalHandle<S> {
        TemporalHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: State> Middleware<S> for Temporal<S> {
    fn name(&self) -> &'static str {
        "temporal"
    }

    fn validate(&self) -> ConfigCheck {
        if self.shared.max_depth == 0 {
            Validation::fail(ConfigError::ZeroMaxDepth)
        } else {
            Validation::success(())
        }
    }

    fn attach(&self, store: &Store<S>) -> Result<(), BuildError> {
        self.shared
            .target
            .set(store.downgrade())
            .map_err(|_| BuildError::Attach {
                middleware: "temporal",
                reason: "already attached to a store".to_string(),
            })
    }

    fn committed(&self, transition: &Transition<S>) {
        let shared = &self.shared;
        match transition.origin {
            Origin::Undo => return shared.advance(Direction::Back, Arc::clone(&transition.prev)),
            Origin::Redo => return shared.advance(Direction::Forward, Arc::clone(&transition.prev)),
            _ => {}
        }
        if !transition.origin.is_tracked() || !shared.tracking.load(Ordering::SeqCst) {
            return;
        }
        if shared.unchanged(&transition.prev, &transition.next) {
            return;
        }
        let snapshot = Snapshot::capture(Arc::clone(&transition.prev));
        let max_depth = shared.max_depth;
        shared.modify(|history| Some((history.record(snapshot, max_depth), ())));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Undo/redo actions and history access for a store.
///
/// Undo at an empty past and redo at an empty future are no-ops. History
/// moves after the restored state is installed, so facet listeners see
/// the store already replayed. A replay vetoed by another layer leaves
/// history unchanged.
pub struct TemporalHandle<S: State> {
    shared: Arc<Shared<S>>,
}

impl<S: State> Clone for TemporalHandle<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: State> TemporalHandle<S> {
    /// Restore the most recent past snapshot.
    pub fn undo(&self) -> Result<(), StoreError> {
        self.replay(Direction::Back)
    }

    /// Re-apply the most recently undone snapshot.
    pub fn redo(&self) -> Result<(), StoreError> {
        self.replay(Direction::Forward)
    }

    fn replay(&self, direction: Direction) -> Result<(), StoreError> {
        let Some(store) = self.shared.target.get().and_then(WeakStore::upgrade) else {
            return Ok(());
        };
        let origin = match direction {
            Direction::Back => Origin::Undo,
            Direction::Forward => Origin::Redo,
        };
        let shared = Arc::clone(&self.shared);
        store.set_with(
            origin,
            Update::compute(move |current: &S| shared.replay_target(direction, current)),
        )
    }

    /// Empty both stacks without touching the store's state.
    pub fn clear(&self) {
        self.shared.modify(|history| {
            if history.is_empty() {
                None
            } else {
                Some((TemporalState::new(), ()))
            }
        });
    }

    /// Stop recording transitions.
    pub fn pause(&self) {
        self.shared.tracking.store(false, Ordering::SeqCst);
    }

    /// Resume recording transitions.
    pub fn resume(&self) {
        self.shared.tracking.store(true, Ordering::SeqCst);
    }

    pub fn is_tracking(&self) -> bool {
        self.shared.tracking.load(Ordering::SeqCst)
    }

    /// Current history.
    pub fn get_state(&self) -> TemporalState<S> {
        lock(&self.shared.history).clone()
    }

    pub fn past_len(&self) -> usize {
        lock(&self.shared.history).past().len()
    }

    pub fn future_len(&self) -> usize {
        lock(&self.shared.history).future().len()
    }

    pub fn can_undo(&self) -> bool {
        lock(&self.shared.history).can_undo()
    }

    pub fn can_redo(&self) -> bool {
        lock(&self.shared.history).can_redo()
    }

    /// Listen to history changes.
    pub fn subscribe<L>(&self, listener: L) -> Subscription
    where
        L: Fn(&TemporalState<S>, &TemporalState<S>) + Send + Sync + 'static,
    {
        self.shared.facet.subscribe(listener)
    }

    /// The store publishing this history.
    pub fn facet(&self) -> Store<TemporalState<S>> {
        self.shared.facet.clone()
    }
}

impl<S: State> Store<S> {
    /// Undo/redo handle, if the store was built with [`Temporal`].
    pub fn temporal(&self) -> Option<TemporalHandle<S>> {
        self.find::<Temporal<S>>().map(Temporal::handle)
    }
}
