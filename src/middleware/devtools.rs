//! Transition log for inspecting a running store.

use super::Middleware;
use crate::core::{changed_fields, to_fields, State, Transition};
use crate::core::store::lock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One committed transition as recorded by [`Devtools`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Origin label: `set`, an action name, `undo`, `redo` or `hydrate`
    pub label: String,
    /// Names of the fields that changed
    pub changed: Vec<String>,
    pub at: DateTime<Utc>,
}

/// Records every committed transition into a bounded log and emits it as
/// a `tracing` event at debug level.
pub struct Devtools {
    store_name: String,
    capacity: usize,
    log: Mutex<VecDeque<ActionRecord>>,
}

impl Devtools {
    /// Log for the store called `store_name`, keeping the last 50 entries.
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
            capacity: 50,
            log: Mutex::new(VecDeque::new()),
        }
    }

    /// Keep at most `capacity` entries (at least one).
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Recorded transitions, oldest first.
    pub fn actions(&self) -> Vec<ActionRecord> {
        lock(&self.log).iter().cloned().collect()
    }

    pub fn clear(&self) {
        lock(&self.log).clear();
    }
}

impl<S: State> Middleware<S> for Devtools {
    fn name(&self) -> &'static str {
        "devtools"
    }

    fn committed(&self, transition: &Transition<S>) {
        let changed = match (to_fields(&*transition.prev), to_fields(&*transition.next)) {
            (Ok(prev), Ok(next)) => changed_fields(&prev, &next),
            _ => Vec::new(),
        };
        tracing::debug!(
            store = %self.store_name,
            action = %transition.origin,
            changed = ?changed,
            "state changed"
        );

        let mut log = lock(&self.log);
        if log.len() == self.capacity {
            log.pop_front();
        }
        log.push_back(ActionRecord {
            label: transition.origin.label().to_string(),
            changed,
            at: Utc::now(),
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
