//! Builder for composing a store from an initial state and middleware.

use super::error::{BuildError, ConfigError};
use super::{ConfigCheck, Middleware};
use crate::config::StoreConfig;
use crate::core::{State, Store};
use std::collections::HashSet;
use stillwater::validation::Validation;

/// Builder for composing stores with a fluent API.
///
/// Middleware are applied in the order they are added: the first one is
/// innermost. The conventional stack adds history tracking first and
/// persistence second, so persistence observes the fully resolved state.
///
/// # Example
///
/// ```rust
/// use holdfast::temporal::{Temporal, TemporalOptions};
/// use holdfast::Store;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
/// struct Counter {
///     count: i64,
/// }
///
/// let store = Store::builder(Counter { count: 0 })
///     .with(Temporal::new(TemporalOptions::new().max_depth(10)))
///     .build()
///     .unwrap();
///
/// store.update(|c| Counter { count: c.count + 1 }).unwrap();
/// store.temporal().unwrap().undo().unwrap();
/// assert_eq!(store.get_state().count, 0);
/// ```
pub struct StoreBuilder<S: State> {
    initial: S,
    config: StoreConfig,
    middleware: Vec<Box<dyn Middleware<S>>>,
}

impl<S: State> StoreBuilder<S> {
    /// Create a builder with default settings and no middleware.
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            config: StoreConfig::default(),
            middleware: Vec::new(),
        }
    }

    /// Replace the core settings.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Bound the transitions applied within one notification pass.
    pub fn max_nested_updates(mut self, limit: usize) -> Self {
        self.config.max_nested_updates = limit;
        self
    }

    /// Add a middleware layer outside the ones already added.
    pub fn with<M: Middleware<S>>(mut self, middleware: M) -> Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    /// Validate every layer, assemble the store and attach the layers.
    ///
    /// Validation accumulates all problems instead of stopping at the
    /// first one.
    pub fn build(self) -> Result<Store<S>, BuildError> {
        if let Validation::Failure(errors) = self.validate() {
            return Err(BuildError::InvalidConfig(errors));
        }

        let names: Vec<&'static str> = self.middleware.iter().map(|layer| layer.name()).collect();
        let store = Store::assemble(self.initial, &self.config, self.middleware);
        store.attach_middleware()?;
        tracing::debug!(middleware = ?names, "store assembled");
        Ok(store)
    }

    fn validate(&self) -> ConfigCheck {
        let mut checks: Vec<ConfigCheck> = Vec::new();

        checks.push(if self.config.max_nested_updates == 0 {
            Validation::fail(ConfigError::ZeroNestedUpdates)
        } else {
            Validation::success(())
        });

        let mut seen = HashSet::new();
        for layer in &self.middleware {
            let name = layer.name();
            if !seen.insert(name) {
                checks.push(Validation::fail(ConfigError::DuplicateMiddleware { name }));
            }
            checks.push(layer.validate());
        }

        Validation::all_vec(checks).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Origin, Transition};
    use serde::{Deserialize, Serialize};
    use std::any::Any;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
    struct Level {
        value: i32,
    }

    /// Records the order hooks run in.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        bump: i32,
    }

    impl Middleware<Level> for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn attach(&self, _store: &Store<Level>) -> Result<(), BuildError> {
            self.log.lock().unwrap().push(format!("attach:{}", self.name));
            Ok(())
        }

        fn prepare(&self, _prev: &Level, next: Level, _origin: &Origin) -> Level {
            self.log
                .lock()
                .unwrap()
                .push(format!("prepare:{}:{}", self.name, next.value));
            Level {
                value: next.value + self.bump,
            }
        }

        fn committed(&self, transition: &Transition<Level>) {
            self.log
                .lock()
                .unwrap()
                .push(format!("commit:{}:{}", self.name, transition.next.value));
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Broken;

    impl Middleware<Level> for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn validate(&self) -> ConfigCheck {
            Validation::fail(ConfigError::ZeroMaxDepth)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>, bump: i32) -> Recorder {
        Recorder {
            name,
            log: Arc::clone(log),
            bump,
        }
    }

    #[test]
    fn layers_run_innermost_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = StoreBuilder::new(Level { value: 0 })
            .with(recorder("inner", &log, 1))
            .with(recorder("outer", &log, 10))
            .build()
            .unwrap();

        store.update(|_| Level { value: 100 }).unwrap();

        assert_eq!(store.get_state().value, 111);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "attach:inner",
                "attach:outer",
                "prepare:inner:100",
                "prepare:outer:101",
                "commit:inner:111",
                "commit:outer:111",
            ]
        );
    }

    #[test]
    fn no_op_after_prepare_is_not_committed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = StoreBuilder::new(Level { value: 0 })
            .with(recorder("flat", &log, 0))
            .build()
            .unwrap();
        log.lock().unwrap().clear();

        store.update(|level| level.clone()).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["prepare:flat:0"]);
    }

    #[test]
    fn builder_accumulates_all_problems() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let result = StoreBuilder::new(Level { value: 0 })
            .max_nested_updates(0)
            .with(recorder("twice", &log, 0))
            .with(recorder("twice", &log, 0))
            .with(Broken)
            .build();

        match result {
            Err(BuildError::InvalidConfig(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected InvalidConfig, got {:?}", other.map(|_| ())),
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn find_returns_layer_by_type() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = StoreBuilder::new(Level { value: 0 })
            .with(recorder("only", &log, 0))
            .build()
            .unwrap();

        assert_eq!(store.find::<Recorder>().map(|p| p.name), Some("only"));
        assert!(store.find::<Broken>().is_none());
        assert_eq!(store.middleware_names(), vec!["only"]);
    }
}
