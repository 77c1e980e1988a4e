//! Persistence settings and the pluggable functions behind them.

use super::codec::{JsonCodec, RecordCodec};
use super::storage::StorageAdapter;
use crate::config::PersistConfig;
use crate::core::{merge_fields, pick, to_fields, Fields, State, StoreError};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Selects the part of the state that is written to storage.
pub type Partialize<S> = Arc<dyn Fn(&S) -> Result<Fields, StoreError> + Send + Sync>;

/// Upgrades a payload written with an older version.
///
/// Receives the stored payload and the version it was written with.
pub type Migrate = Arc<dyn Fn(Value, u32) -> Result<Value, String> + Send + Sync>;

/// Combines a persisted payload with the current state.
pub type Merge<S> = Arc<dyn Fn(Fields, &S) -> Result<S, StoreError> + Send + Sync>;

/// Settings for [`Persist`](super::Persist).
///
/// Defaults: version 0, every field persisted, shallow merge of the
/// payload over the current state, JSON records, hydration on attach and
/// the ambient tokio runtime.
pub struct PersistOptions<S> {
    pub(crate) name: String,
    pub(crate) storage: Option<Arc<dyn StorageAdapter>>,
    pub(crate) version: u32,
    pub(crate) partialize: Partialize<S>,
    pub(crate) migrate: Option<Migrate>,
    pub(crate) merge: Merge<S>,
    pub(crate) codec: Arc<dyn RecordCodec>,
    pub(crate) skip_hydration: bool,
    pub(crate) runtime: Option<Handle>,
}

impl<S: State> PersistOptions<S> {
    /// Options persisting under the storage key `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage: None,
            version: 0,
            partialize: Arc::new(|state: &S| to_fields(state)),
            migrate: None,
            merge: Arc::new(|payload: Fields, current: &S| merge_fields(current, payload)),
            codec: Arc::new(JsonCodec),
            skip_hydration: false,
            runtime: None,
        }
    }

    /// Options seeded from serialized settings.
    pub fn from_config(config: &PersistConfig) -> Self {
        let options = Self::new(config.name.clone())
            .version(config.version)
            .skip_hydration(config.skip_hydration);
        match &config.fields {
            Some(fields) => options.persist_fields(fields.iter().cloned()),
            None => options,
        }
    }

    pub fn storage<A: StorageAdapter + 'static>(mut self, storage: A) -> Self {
        self.storage = Some(Arc::new(storage));
        self
    }

    /// Use an adapter shared with other stores.
    pub fn shared_storage(mut self, storage: Arc<dyn StorageAdapter>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Choose what is written to storage.
    pub fn partialize<F>(mut self, partialize: F) -> Self
    where
        F: Fn(&S) -> Fields + Send + Sync + 'static,
    {
        self.partialize = Arc::new(move |state: &S| Ok(partialize(state)));
        self
    }

    /// Persist only the named fields.
    pub fn persist_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        let keep: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
        self.partialize = Arc::new(move |state: &S| to_fields(state).map(|all| pick(&all, &keep)));
        self
    }

    pub fn migrate<F>(mut self, migrate: F) -> Self
    where
        F: Fn(Value, u32) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.migrate = Some(Arc::new(migrate));
        self
    }

    /// Replace the default shallow merge.
    pub fn merge<F>(mut self, merge: F) -> Self
    where
        F: Fn(Fields, &S) -> Result<S, StoreError> + Send + Sync + 'static,
    {
        self.merge = Arc::new(merge);
        self
    }

    pub fn codec<C: RecordCodec + 'static>(mut self, codec: C) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Leave hydration to an explicit `rehydrate` call.
    pub fn skip_hydration(mut self, skip: bool) -> Self {
        self.skip_hydration = skip;
        self
    }

    /// Run storage I/O on this runtime instead of the ambient one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }
}
