//! Store core: state, updates, transitions and the store itself.
//!
//! This module contains everything a store needs without middleware:
//! - The `State` trait and the record view used for merges
//! - `Update` requests and committed `Transition`s
//! - The `Store` container with ordered, reentrancy-safe notification

mod error;
mod listener;
mod state;
pub(crate) mod store;
mod transition;

pub use error::StoreError;
pub use listener::Subscription;
pub use state::{changed_fields, from_fields, merge_fields, omit, pick, to_fields, Fields, State};
pub use store::{Store, WeakStore};
pub use transition::{Origin, Transition, Update};
