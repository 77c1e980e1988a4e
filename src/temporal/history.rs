//! Undo/redo history values.
//!
//! History is immutable: every operation returns a new `TemporalState`
//! and leaves the original untouched, so a published history can be
//! handed to subscribers without copying on read.

use crate::core::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A captured state held in history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Snapshot<S: State> {
    /// The captured state
    pub state: Arc<S>,
    /// When the state was captured
    pub recorded_at: DateTime<Utc>,
}

impl<S: State> Snapshot<S> {
    /// Capture a state now.
    pub fn capture(state: Arc<S>) -> Self {
        Self {
            state,
            recorded_at: Utc::now(),
        }
    }
}

/// Past and future stacks of a tracked store.
///
/// The most recent entry of each stack is its last element.
///
/// # Example
///
/// ```rust
/// use holdfast::temporal::{Snapshot, TemporalState};
/// use std::sync::Arc;
///
/// let history = TemporalState::new()
///     .record(Snapshot::capture(Arc::new(0)), 2)
///     .record(Snapshot::capture(Arc::new(1)), 2)
///     .record(Snapshot::capture(Arc::new(2)), 2);
///
/// // oldest entry evicted at depth 2
/// assert_eq!(history.past_states(), vec![&1, &2]);
///
/// let (history, restored) = history.step_back(Snapshot::capture(Arc::new(3))).unwrap();
/// assert_eq!(*restored.state, 2);
/// assert_eq!(history.future_states(), vec![&3]);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TemporalState<S: State> {
    past: Vec<Snapshot<S>>,
    future: Vec<Snapshot<S>>,
}

impl<S: State> Default for TemporalState<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State> TemporalState<S> {
    /// Empty history.
    pub fn new() -> Self {
        Self {
            past: Vec::new(),
            future: Vec::new(),
        }
    }

    /// Record a pre-transition snapshot, returning a new history.
    ///
    /// Evicts the oldest past entry when `max_depth` is reached and clears
    /// the future stack.
    pub fn record(&self, snapshot: Snapshot<S>, max_depth: usize) -> Self {
        Self {
            past: push_bounded(&self.past, snapshot, max_depth),
            future: Vec::new(),
        }
    }

    /// Move one step back.
    ///
    /// Returns the new history (with `current` pushed onto the future
    /// stack) and the snapshot to restore, or `None` when there is no past.
    pub fn step_back(&self, current: Snapshot<S>) -> Option<(Self, Snapshot<S>)> {
        let mut past = self.past.clone();
        let restored = past.pop()?;
        let mut future = self.future.clone();
        future.push(current);
        Some((Self { past, future }, restored))
    }

    /// Move one step forward.
    ///
    /// Returns the new history (with `current` pushed onto the past stack,
    /// bounded by `max_depth`) and the snapshot to restore, or `None` when
    /// there is no future.
    pub fn step_forward(&self, current: Snapshot<S>, max_depth: usize) -> Option<(Self, Snapshot<S>)> {
        let mut future = self.future.clone();
        let restored = future.pop()?;
        let past = push_bounded(&self.past, current, max_depth);
        Some((Self { past, future }, restored))
    }

    /// Past snapshots, oldest first.
    pub fn past(&self) -> &[Snapshot<S>] {
        &self.past
    }

    /// Future snapshots; the next one to redo is last.
    pub fn future(&self) -> &[Snapshot<S>] {
        &self.future
    }

    /// Past states, oldest first.
    pub fn past_states(&self) -> Vec<&S> {
        self.past.iter().map(|snapshot| &*snapshot.state).collect()
    }

    /// Future states; the next one to redo is last.
    pub fn future_states(&self) -> Vec<&S> {
        self.future.iter().map(|snapshot| &*snapshot.state).collect()
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.past.is_empty() && self.future.is_empty()
    }
}

fn push_bounded<S: State>(stack: &[Snapshot<S>], snapshot: Snapshot<S>, max_depth: usize) -> Vec<Snapshot<S>> {
    let keep = max_depth.saturating_sub(1).min(stack.len());
    let mut next = stack[stack.len() - keep..].to_vec();
    next.push(snapshot);
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(value: i32) -> Snapshot<i32> {
        Snapshot::capture(Arc::new(value))
    }

    #[test]
    fn new_history_is_empty() {
        let history: TemporalState<i32> = TemporalState::new();
        assert!(history.is_empty());
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn record_is_immutable() {
        let history = TemporalState::new();
        let recorded = history.record(snap(1), 10);

        assert!(history.past().is_empty());
        assert_eq!(recorded.past_states(), vec![&1]);
    }

    #[test]
    fn record_evicts_oldest_at_depth() {
        let history = (0..5).fold(TemporalState::new(), |h, i| h.record(snap(i), 3));
        assert_eq!(history.past_states(), vec![&2, &3, &4]);
    }

    #[test]
    fn record_clears_future() {
        let history = TemporalState::new().record(snap(0), 10);
        let (history, _) = history.step_back(snap(1)).unwrap();
        assert!(history.can_redo());

        let history = history.record(snap(0), 10);
        assert!(!history.can_redo());
    }

    #[test]
    fn step_back_on_empty_past_is_none() {
        let history: TemporalState<i32> = TemporalState::new();
        assert!(history.step_back(snap(0)).is_none());
        assert!(history.step_forward(snap(0), 10).is_none());
    }

    #[test]
    fn steps_move_between_stacks() {
        let history = TemporalState::new().record(snap(0), 10).record(snap(1), 10);

        let (history, restored) = history.step_back(snap(2)).unwrap();
        assert_eq!(*restored.state, 1);
        assert_eq!(history.past_states(), vec![&0]);
        assert_eq!(history.future_states(), vec![&2]);

        let (history, restored) = history.step_forward(snap(1), 10).unwrap();
        assert_eq!(*restored.state, 2);
        assert_eq!(history.past_states(), vec![&0, &1]);
        assert!(history.future().is_empty());
    }

    #[test]
    fn step_forward_respects_depth() {
        let history = TemporalState::new().record(snap(0), 1);
        let (history, _) = history.step_back(snap(1)).unwrap();
        let history = history.record(snap(5), 1);
        assert_eq!(history.past_states(), vec![&5]);

        let base = TemporalState {
            past: vec![snap(7)],
            future: vec![snap(9)],
        };
        let (history, _) = base.step_forward(snap(8), 1).unwrap();
        assert_eq!(history.past_states(), vec![&8]);
    }

    #[test]
    fn history_serializes_correctly() {
        let history = TemporalState::new().record(snap(1), 10).record(snap(2), 10);
        let json = serde_json::to_string(&history).unwrap();
        let restored: TemporalState<i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.past_states(), vec![&1, &2]);
    }
}
