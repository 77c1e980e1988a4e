//! Middleware: composable layers around the store core.
//!
//! A middleware is a value implementing [`Middleware`]. The composer
//! ([`StoreBuilder`]) holds them in an explicit ordered list; the first
//! layer added is the innermost one, closest to the core.
//!
//! Each committed transition flows through the layers in order:
//!
//! 1. `prepare` runs innermost first and may adjust the proposed state;
//!    outer layers see what inner layers produced.
//! 2. If the resolved state equals the previous one, the transition stops
//!    here: no layer observes it and no listener runs.
//! 3. The state is installed, then `committed` runs innermost first.
//! 4. Listeners are notified.

mod compose;
pub mod devtools;
pub mod error;

pub use compose::StoreBuilder;
pub use devtools::{ActionRecord, Devtools};
pub use error::{BuildError, ConfigError};

use crate::core::{Origin, State, Store, Transition};
use std::any::Any;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Result of validating a middleware's configuration.
pub type ConfigCheck = Validation<(), NonEmptyVec<ConfigError>>;

/// A layer of cross-cutting behavior around a store.
///
/// All hooks except [`Middleware::name`] and [`Middleware::as_any`] have
/// no-op defaults.
///
/// # Example
///
/// ```rust
/// use holdfast::core::{Origin, Store};
/// use holdfast::middleware::Middleware;
/// use serde::{Deserialize, Serialize};
/// use std::any::Any;
///
/// #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
/// struct Volume {
///     level: i32,
/// }
///
/// /// Keeps the level within 0..=10.
/// struct Clamp;
///
/// impl Middleware<Volume> for Clamp {
///     fn name(&self) -> &'static str {
///         "clamp"
///     }
///
///     fn prepare(&self, _prev: &Volume, next: Volume, _origin: &Origin) -> Volume {
///         Volume { level: next.level.clamp(0, 10) }
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
///
/// let store = Store::builder(Volume { level: 5 }).with(Clamp).build().unwrap();
/// store.update(|v| Volume { level: v.level + 20 }).unwrap();
/// assert_eq!(store.get_state().level, 10);
/// ```
pub trait Middleware<S: State>: Any + Send + Sync {
    /// Stable name used in logs and duplicate detection.
    fn name(&self) -> &'static str;

    /// Check the layer's configuration before the store is assembled.
    fn validate(&self) -> ConfigCheck {
        Validation::success(())
    }

    /// Called once, innermost first, after the store is assembled.
    fn attach(&self, _store: &Store<S>) -> Result<(), BuildError> {
        Ok(())
    }

    /// Adjust a proposed state before it is committed.
    fn prepare(&self, _prev: &S, next: S, _origin: &Origin) -> S {
        next
    }

    /// Observe a committed transition before listeners run.
    fn committed(&self, _transition: &Transition<S>) {}

    /// Downcasting support for [`Store::find`].
    fn as_any(&self) -> &dyn Any;
}
