//! Serializable settings for stores and their middleware.
//!
//! These mirror the tunable parts of the option builders so that
//! applications can keep store settings in their own configuration files.
//! Behavior that cannot be expressed as data (partialize, merge, migrate,
//! custom equality) is attached on the option builders afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default bound on transitions applied within one notification pass.
pub const DEFAULT_MAX_NESTED_UPDATES: usize = 100;

/// Default number of snapshots kept in undo history.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Core store settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Transitions allowed in one drain before the store reports a
    /// runaway listener chain
    pub max_nested_updates: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_nested_updates: DEFAULT_MAX_NESTED_UPDATES,
        }
    }
}

/// Undo/redo history settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    pub max_depth: usize,
    /// Fields left out of history comparisons and restored from the
    /// current state on undo/redo
    pub exclude: BTreeSet<String>,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            exclude: BTreeSet::new(),
        }
    }
}

/// Persistence settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Storage key
    pub name: String,
    pub version: u32,
    /// Fields written to storage; all fields when `None`
    pub fields: Option<BTreeSet<String>>,
    pub skip_hydration: bool,
}
