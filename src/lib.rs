//! Holdfast: a minimal observable state store with composable middleware.
//!
//! A [`Store`] holds one immutable state value, replaces it on every
//! update and notifies subscribers with the new and previous values.
//! Middleware layers wrap the store to add behavior:
//!
//! - [`temporal`]: bounded undo/redo history with its own observable facet
//! - [`persist`]: hydration from and ordered writes to async storage
//! - [`middleware::Devtools`]: a bounded log of committed transitions
//!
//! # Core Concepts
//!
//! - **State**: any cloneable, comparable, serializable value; records
//!   (structs) also get shallow merges and field-level tracking
//! - **Update**: a full replacement or a partial record merged over the
//!   previous state
//! - **Middleware**: explicit, ordered layers composed with
//!   [`StoreBuilder`]
//!
//! # Example
//!
//! ```rust
//! use holdfast::temporal::{Temporal, TemporalOptions};
//! use holdfast::Store;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! let store = Store::builder(Counter { count: 0 })
//!     .with(Temporal::new(TemporalOptions::new().max_depth(50)))
//!     .build()
//!     .unwrap();
//!
//! for _ in 0..3 {
//!     store.update(|c| Counter { count: c.count + 1 }).unwrap();
//! }
//!
//! let history = store.temporal().unwrap();
//! history.undo().unwrap();
//! assert_eq!(store.get_state().count, 2);
//! history.redo().unwrap();
//! assert_eq!(store.get_state().count, 3);
//! ```

pub mod config;
pub mod core;
pub mod middleware;
pub mod persist;
pub mod temporal;

// Re-export commonly used types
pub use config::{PersistConfig, StoreConfig, TemporalConfig};
pub use core::{Fields, Origin, State, Store, StoreError, Subscription, Transition, Update};
pub use middleware::{BuildError, Middleware, StoreBuilder};
pub use persist::{Persist, PersistHandle, PersistOptions};
pub use temporal::{Temporal, TemporalHandle, TemporalOptions};
