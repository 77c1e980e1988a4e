//! Updates and committed transitions.

use super::error::StoreError;
use super::state::{merge_fields, Fields, State};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Where a transition came from.
///
/// Middleware use the origin to decide how to treat a transition: history
/// tracking records only [`Origin::Set`] and [`Origin::Action`], while
/// replays and hydration pass through untracked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Plain `set_state` call
    Set,
    /// Labelled update issued through `Store::dispatch`
    Action(Cow<'static, str>),
    /// Replay of a past snapshot
    Undo,
    /// Replay of a future snapshot
    Redo,
    /// State restored from storage
    Hydrate,
}

impl Origin {
    /// Whether history tracking should record this transition.
    pub fn is_tracked(&self) -> bool {
        matches!(self, Self::Set | Self::Action(_))
    }

    /// Whether this transition replays recorded history.
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Undo | Self::Redo)
    }

    /// Short label for logs and devtools.
    pub fn label(&self) -> &str {
        match self {
            Self::Set => "set",
            Self::Action(name) => name.as_ref(),
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::Hydrate => "hydrate",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A requested change to the state.
///
/// `Replace` and `Compute` produce the whole next state. `Merge` and
/// `ComputePartial` produce a partial record that is shallow-merged over
/// the previous state.
pub enum Update<S> {
    Replace(S),
    Merge(Fields),
    Compute(Box<dyn FnOnce(&S) -> S + Send>),
    ComputePartial(Box<dyn FnOnce(&S) -> Fields + Send>),
}

impl<S: State> Update<S> {
    /// Full update computed from the previous state.
    pub fn compute<F>(f: F) -> Self
    where
        F: FnOnce(&S) -> S + Send + 'static,
    {
        Self::Compute(Box::new(f))
    }

    /// Partial update computed from the previous state.
    pub fn compute_partial<F>(f: F) -> Self
    where
        F: FnOnce(&S) -> Fields + Send + 'static,
    {
        Self::ComputePartial(Box::new(f))
    }

    /// Resolve the update against the previous state.
    pub(crate) fn resolve(self, prev: &S) -> Result<S, StoreError> {
        match self {
            Self::Replace(next) => Ok(next),
            Self::Merge(partial) => merge_fields(prev, partial),
            Self::Compute(f) => Ok(f(prev)),
            Self::ComputePartial(f) => merge_fields(prev, f(prev)),
        }
    }
}

impl<S> fmt::Debug for Update<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace(_) => f.write_str("Update::Replace"),
            Self::Merge(fields) => f.debug_tuple("Update::Merge").field(fields).finish(),
            Self::Compute(_) => f.write_str("Update::Compute"),
            Self::ComputePartial(_) => f.write_str("Update::ComputePartial"),
        }
    }
}

/// A committed change, as seen by middleware.
#[derive(Clone, Debug)]
pub struct Transition<S> {
    /// State before the change
    pub prev: Arc<S>,
    /// State after the change
    pub next: Arc<S>,
    /// What caused the change
    pub origin: Origin,
}
