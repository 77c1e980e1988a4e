//! Persistence: hydrate a store from storage and write it back after
//! every change.
//!
//! Storage I/O runs on one background tokio task per store. That task
//! first hydrates (reads the record, migrates it if its version is old,
//! merges it over the current state) and then writes queued records in
//! order. Only the most recent pending record is kept, so the last
//! committed state is always the last one written.
//!
//! Storage failures never break the store: they disable persistence for
//! the rest of the session and are published on the error channel
//! returned by [`PersistHandle::errors`].
//!
//! # Example
//!
//! ```rust
//! use holdfast::persist::{HydrationOutcome, MemoryStorage, Persist, PersistOptions};
//! use holdfast::Store;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
//! struct Settings {
//!     theme: String,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let storage = MemoryStorage::new();
//! storage.insert("settings", r#"{"version":0,"payload":{"theme":"dark"}}"#);
//!
//! let store = Store::builder(Settings { theme: "light".into() })
//!     .with(Persist::new(PersistOptions::new("settings").storage(storage.clone())))
//!     .build()
//!     .unwrap();
//!
//! let persist = store.persist().unwrap();
//! assert_eq!(persist.wait_for_hydration().await, HydrationOutcome::Restored);
//! assert_eq!(store.get_state().theme, "dark");
//! # }
//! ```

mod codec;
pub mod error;
mod file;
mod options;
mod queue;
mod storage;

pub use codec::{JsonCodec, PersistedRecord, RecordCodec};
pub use error::{PersistError, StorageError};
pub use file::FileStorage;
pub use options::{Merge, Migrate, Partialize, PersistOptions};
pub use storage::{MemoryStorage, StorageAdapter, SyncAdapter, SyncStorage};

use crate::core::store::lock;
use crate::core::{Fields, Origin, State, Store, Transition, Update, WeakStore};
use crate::middleware::{BuildError, ConfigCheck, ConfigError, Middleware};
use queue::{Job, WriteQueue};
use serde_json::Value;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use stillwater::validation::Validation;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};

const ERROR_CHANNEL_CAPACITY: usize = 16;

/// How the last hydration attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HydrationOutcome {
    /// A record with the current version was merged into the state
    Restored,
    /// An older record was migrated and merged into the state
    Migrated { from: u32 },
    /// Storage held no record
    Missing,
    /// The record could not be decoded, migrated or merged; defaults kept
    Discarded,
    /// Storage failed; persistence is disabled
    StorageFailed,
    /// No storage was configured; persistence is disabled
    Unavailable,
}

struct Shared<S: State> {
    name: String,
    version: u32,
    storage: Option<Arc<dyn StorageAdapter>>,
    codec: Arc<dyn RecordCodec>,
    partialize: Partialize<S>,
    migrate: Option<Migrate>,
    merge: Merge<S>,
    skip_hydration: bool,
    runtime: Option<Handle>,
    enabled: AtomicBool,
    hydration: watch::Sender<Option<HydrationOutcome>>,
    errors: broadcast::Sender<PersistError>,
    queue: WriteQueue,
    last_payload: Mutex<Option<Fields>>,
    target: OnceLock<WeakStore<S>>,
}

impl<S: State> Shared<S> {
    fn publish(&self, error: PersistError) {
        // no subscribers is fine
        let _ = self.errors.send(error);
    }

    fn disable(&self, error: StorageError) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            tracing::warn!(name = %self.name, error = %error, "storage failed; persistence disabled");
        }
        self.publish(PersistError::Storage(error));
    }

    fn discard(&self, error: PersistError) -> HydrationOutcome {
        tracing::warn!(name = %self.name, error = %error, "persisted state discarded");
        self.publish(error);
        HydrationOutcome::Discarded
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Read, migrate and merge the stored record into the store.
    async fn hydrate(self: &Arc<Self>) -> HydrationOutcome {
        let Some(storage) = &self.storage else {
            return HydrationOutcome::Unavailable;
        };
        if !self.is_enabled() {
            return HydrationOutcome::StorageFailed;
        }

        let raw = match storage.get_item(&self.name).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return HydrationOutcome::Missing,
            Err(e) => {
                self.disable(e);
                return HydrationOutcome::StorageFailed;
            }
        };
        let record = match self.codec.decode(&raw) {
            Ok(record) => record,
            Err(e) => return self.discard(e),
        };

        let (payload, outcome) = if record.version == self.version {
            (record.payload, HydrationOutcome::Restored)
        } else {
            let Some(migrate) = &self.migrate else {
                return self.discard(PersistError::VersionMismatch {
                    found: record.version,
                    expected: self.version,
                });
            };
            match migrate(record.payload, record.version) {
                Ok(payload) => (payload, HydrationOutcome::Migrated { from: record.version }),
                Err(reason) => {
                    return self.discard(PersistError::Migration {
                        from: record.version,
                        reason,
                    })
                }
            }
        };

        let Value::Object(fields) = payload else {
            return self.discard(PersistError::Decode("payload is not a record".to_string()));
        };
        let Some(store) = self.target.get().and_then(WeakStore::upgrade) else {
            return outcome;
        };

        // a restored payload is already in storage and is not written back
        let remembered = (outcome == HydrationOutcome::Restored).then(|| fields.clone());
        let failure = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&failure);
        let shared = Arc::clone(self);
        let applied = store.set_with(
            Origin::Hydrate,
            Update::compute(move |current: &S| match (shared.merge)(fields, current) {
                Ok(merged) => {
                    if remembered.is_some() {
                        *lock(&shared.last_payload) = remembered;
                    }
                    merged
                }
                Err(e) => {
                    *lock(&sink) = Some(e);
                    current.clone()
                }
            }),
        );
        if let Err(e) = applied {
            return self.discard(PersistError::Merge(e.to_string()));
        }
        let merge_error = lock(&failure).take();
        match merge_error {
            Some(e) => self.discard(PersistError::Merge(e.to_string())),
            None => {
                tracing::debug!(name = %self.name, ?outcome, "state hydrated");
                outcome
            }
        }
    }

    /// Queue the partialized state for writing unless it is unchanged.
    fn enqueue(&self, state: &S) {
        let payload = match (self.partialize)(state) {
            Ok(payload) => payload,
            Err(e) => {
                self.publish(PersistError::Encode(e.to_string()));
                return;
            }
        };
        {
            let mut last = lock(&self.last_payload);
            if last.as_ref() == Some(&payload) {
                tracing::trace!(name = %self.name, "persisted payload unchanged");
                return;
            }
            *last = Some(payload.clone());
        }

        let record = PersistedRecord {
            version: self.version,
            payload: Value::Object(payload),
        };
        match self.codec.encode(&record) {
            Ok(raw) => {
                self.queue.push(Job::Write(raw));
            }
            Err(e) => self.publish(e),
        }
    }

    async fn execute(&self, job: Job) {
        let Some(storage) = &self.storage else {
            return;
        };
        if !self.is_enabled() {
            return;
        }
        let result = match job {
            Job::Write(raw) => {
                let bytes = raw.len();
                let result = storage.set_item(&self.name, raw).await;
                if result.is_ok() {
                    tracing::debug!(name = %self.name, bytes, "state written");
                }
                result
            }
            Job::Remove => storage.remove_item(&self.name).await,
        };
        if let Err(e) = result {
            self.disable(e);
        }
    }
}

/// The persistence task: hydrate, then run writes until the queue closes.
async fn run<S: State>(shared: Arc<Shared<S>>) {
    if !shared.skip_hydration {
        let outcome = shared.hydrate().await;
        shared.hydration.send_replace(Some(outcome));
    }
    while let Some((seq, job)) = shared.queue.next().await {
        shared.execute(job).await;
        shared.queue.settle(seq);
    }
    shared.queue.settle_all();
    tracing::trace!(name = %shared.name, "persistence task finished");
}

/// Persistence middleware.
pub struct Persist<S: State> {
    shared: Arc<Shared<S>>,
}

impl<S: State> Persist<S> {
    pub fn new(options: PersistOptions<S>) -> Self {
        let (hydration, _) = watch::channel(None);
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        let enabled = options.storage.is_some();
        Self {
            shared: Arc::new(Shared {
                name: options.name,
                version: options.version,
                storage: options.storage,
                codec: options.codec,
                partialize: options.partialize,
                migrate: options.migrate,
                merge: options.merge,
                skip_hydration: options.skip_hydration,
                runtime: options.runtime,
                enabled: AtomicBool::new(enabled),
                hydration,
                errors,
                queue: WriteQueue::new(),
                last_payload: Mutex::new(None),
                target: OnceLock::new(),
            }),
        }
    }

    /// Consumer handle for this layer.
    pub fn handle(&self) -> PersistHandle<S> {
        PersistHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn runtime(&self) -> Option<Handle> {
        self.shared
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }
}

impl<S: State> Middleware<S> for Persist<S> {
    fn name(&self) -> &'static str {
        "persist"
    }

    fn validate(&self) -> ConfigCheck {
        let name = if self.shared.name.trim().is_empty() {
            Validation::fail(ConfigError::EmptyPersistName)
        } else {
            Validation::success(())
        };
        let runtime = if self.shared.storage.is_some() && self.runtime().is_none() {
            Validation::fail(ConfigError::NoRuntime { name: "persist" })
        } else {
            Validation::success(())
        };
        Validation::all_vec(vec![name, runtime]).map(|_| ())
    }

    fn attach(&self, store: &Store<S>) -> Result<(), BuildError> {
        self.shared
            .target
            .set(store.downgrade())
            .map_err(|_| BuildError::Attach {
                middleware: "persist",
                reason: "already attached to a store".to_string(),
            })?;

        if self.shared.storage.is_none() {
            tracing::warn!(name = %self.shared.name, "no storage available; persistence disabled");
            self.shared
                .hydration
                .send_replace(Some(HydrationOutcome::Unavailable));
            return Ok(());
        }

        let runtime = self.runtime().ok_or(BuildError::RuntimeUnavailable {
            middleware: "persist",
        })?;
        runtime.spawn(run(Arc::clone(&self.shared)));
        Ok(())
    }

    fn committed(&self, transition: &Transition<S>) {
        if self.shared.is_enabled() {
            self.shared.enqueue(&transition.next);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<S: State> Drop for Persist<S> {
    fn drop(&mut self) {
        self.shared.queue.close();
    }
}

/// Hydration status and storage controls for a persisted store.
pub struct PersistHandle<S: State> {
    shared: Arc<Shared<S>>,
}

impl<S: State> Clone for PersistHandle<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: State> PersistHandle<S> {
    /// Storage key.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn version(&self) -> u32 {
        self.shared.version
    }

    /// False once storage has failed or when no storage is configured.
    pub fn is_enabled(&self) -> bool {
        self.shared.is_enabled()
    }

    pub fn has_hydrated(&self) -> bool {
        self.shared.hydration.borrow().is_some()
    }

    /// Outcome of the last finished hydration.
    pub fn hydration_outcome(&self) -> Option<HydrationOutcome> {
        *self.shared.hydration.borrow()
    }

    /// Wait until hydration has finished.
    ///
    /// With `skip_hydration` this waits for the first
    /// [`rehydrate`](Self::rehydrate).
    pub async fn wait_for_hydration(&self) -> HydrationOutcome {
        let mut hydration = self.shared.hydration.subscribe();
        let outcome = match hydration.wait_for(Option::is_some).await {
            Ok(outcome) => *outcome,
            Err(_) => None,
        };
        outcome.unwrap_or(HydrationOutcome::Unavailable)
    }

    /// Read storage again and merge the record into the current state.
    ///
    /// Pending writes are flushed first so the read sees them.
    pub async fn rehydrate(&self) -> HydrationOutcome {
        self.flush().await;
        self.shared.hydration.send_replace(None);
        let outcome = self.shared.hydrate().await;
        self.shared.hydration.send_replace(Some(outcome));
        outcome
    }

    /// Wait until every write queued so far has been attempted.
    pub async fn flush(&self) {
        if self.shared.storage.is_some() {
            self.shared.queue.flush().await;
        }
    }

    /// Remove the stored record. The next change writes a fresh one.
    pub async fn clear_storage(&self) -> Result<(), PersistError> {
        if self.shared.storage.is_none() {
            return Err(StorageError::Unavailable("no storage configured".to_string()).into());
        }
        if !self.shared.is_enabled() {
            return Err(StorageError::Unavailable("persistence disabled".to_string()).into());
        }
        *lock(&self.shared.last_payload) = None;
        if self.shared.queue.push(Job::Remove).is_none() {
            return Err(StorageError::Unavailable("store dropped".to_string()).into());
        }
        self.shared.queue.flush().await;
        if self.shared.is_enabled() {
            Ok(())
        } else {
            Err(StorageError::Unavailable("persistence disabled".to_string()).into())
        }
    }

    /// Errors published from now on.
    pub fn errors(&self) -> broadcast::Receiver<PersistError> {
        self.shared.errors.subscribe()
    }
}

impl<S: State> Store<S> {
    /// Persistence handle, if the store was built with [`Persist`].
    pub fn persist(&self) -> Option<PersistHandle<S>> {
        self.find::<Persist<S>>().map(Persist::handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StoreError;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
    struct Prefs {
        theme: String,
        volume: u8,
    }

    fn prefs() -> Prefs {
        Prefs {
            theme: "light".to_string(),
            volume: 5,
        }
    }

    fn build(options: PersistOptions<Prefs>) -> (Store<Prefs>, PersistHandle<Prefs>) {
        let store = Store::builder(prefs())
            .with(Persist::new(options))
            .build()
            .unwrap();
        let persist = store.persist().unwrap();
        (store, persist)
    }

    fn stored(storage: &MemoryStorage, key: &str) -> Value {
        serde_json::from_str(&storage.get(key).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn restores_record_over_defaults() {
        let storage = MemoryStorage::new();
        storage.insert("prefs", r#"{"version":1,"payload":{"theme":"dark"}}"#);
        let (store, persist) = build(PersistOptions::new("prefs").version(1).storage(storage.clone()));

        assert!(!persist.has_hydrated());
        assert_eq!(persist.wait_for_hydration().await, HydrationOutcome::Restored);
        assert!(persist.has_hydrated());
        assert_eq!(
            *store.get_state(),
            Prefs {
                theme: "dark".to_string(),
                volume: 5
            }
        );
    }

    #[tokio::test]
    async fn missing_record_keeps_defaults() {
        let storage = MemoryStorage::new();
        let (store, persist) = build(PersistOptions::new("prefs").storage(storage.clone()));

        assert_eq!(persist.wait_for_hydration().await, HydrationOutcome::Missing);
        assert_eq!(*store.get_state(), prefs());
        assert_eq!(storage.writes(), 0);
    }

    #[tokio::test]
    async fn old_version_is_migrated() {
        let storage = MemoryStorage::new();
        storage.insert("prefs", r#"{"version":1,"payload":{"colour":"dark"}}"#);
        let (store, persist) = build(
            PersistOptions::new("prefs")
                .version(2)
                .storage(storage.clone())
                .migrate(|mut payload, from| {
                    assert_eq!(from, 1);
                    let object = payload.as_object_mut().ok_or("not an object")?;
                    let colour = object.remove("colour").unwrap_or(Value::Null);
                    object.insert("theme".to_string(), colour);
                    Ok(payload)
                }),
        );

        assert_eq!(
            persist.wait_for_hydration().await,
            HydrationOutcome::Migrated { from: 1 }
        );
        assert_eq!(store.get_state().theme, "dark");

        persist.flush().await;
        assert_eq!(
            stored(&storage, "prefs"),
            json!({ "version": 2, "payload": { "theme": "dark", "volume": 5 } })
        );
    }

    #[tokio::test]
    async fn version_mismatch_without_migrate_is_discarded() {
        let storage = MemoryStorage::new();
        storage.insert("prefs", r#"{"version":0,"payload":{"theme":"dark"}}"#);
        let (store, persist) = build(PersistOptions::new("prefs").version(3).storage(storage.clone()));
        let mut errors = persist.errors();

        assert_eq!(persist.wait_for_hydration().await, HydrationOutcome::Discarded);
        assert_eq!(*store.get_state(), prefs());
        assert_eq!(
            errors.recv().await.unwrap(),
            PersistError::VersionMismatch {
                found: 0,
                expected: 3
            }
        );
    }

    #[tokio::test]
    async fn failing_migration_is_discarded() {
        let storage = MemoryStorage::new();
        storage.insert("prefs", r#"{"version":0,"payload":{}}"#);
        let (store, persist) = build(
            PersistOptions::new("prefs")
                .version(1)
                .storage(storage.clone())
                .migrate(|_, _| Err("unsupported layout".to_string())),
        );

        assert_eq!(persist.wait_for_hydration().await, HydrationOutcome::Discarded);
        assert_eq!(*store.get_state(), prefs());
        assert!(persist.is_enabled());
    }

    #[tokio::test]
    async fn malformed_record_is_discarded() {
        let storage = MemoryStorage::new();
        storage.insert("prefs", "{not json");
        let (store, persist) = build(PersistOptions::new("prefs").storage(storage.clone()));

        assert_eq!(persist.wait_for_hydration().await, HydrationOutcome::Discarded);
        assert_eq!(*store.get_state(), prefs());
        assert!(persist.is_enabled());
    }

    #[tokio::test]
    async fn payload_that_does_not_fit_is_discarded() {
        let storage = MemoryStorage::new();
        storage.insert("prefs", r#"{"version":0,"payload":{"volume":"loud"}}"#);
        let (store, persist) = build(PersistOptions::new("prefs").storage(storage.clone()));

        assert_eq!(persist.wait_for_hydration().await, HydrationOutcome::Discarded);
        assert_eq!(*store.get_state(), prefs());
    }

    #[tokio::test]
    async fn rapid_changes_coalesce_to_last_state() {
        let storage = MemoryStorage::new();
        let (store, persist) = build(PersistOptions::new("prefs").storage(storage.clone()));
        persist.wait_for_hydration().await;

        for volume in 0..=50u8 {
            store.update(move |p| Prefs { volume, ..p.clone() }).unwrap();
        }
        persist.flush().await;

        assert_eq!(storage.writes(), 1);
        assert_eq!(stored(&storage, "prefs")["payload"]["volume"], json!(50));
    }

    #[tokio::test]
    async fn unchanged_payload_is_not_rewritten() {
        let storage = MemoryStorage::new();
        let (store, persist) = build(
            PersistOptions::new("prefs")
                .persist_fields(["theme"])
                .storage(storage.clone()),
        );
        persist.wait_for_hydration().await;

        store.update(|p| Prefs { theme: "dark".to_string(), ..p.clone() }).unwrap();
        persist.flush().await;
        store.update(|p| Prefs { volume: 9, ..p.clone() }).unwrap();
        persist.flush().await;

        assert_eq!(storage.writes(), 1);
        assert_eq!(
            stored(&storage, "prefs"),
            json!({ "version": 0, "payload": { "theme": "dark" } })
        );
    }

    #[tokio::test]
    async fn restored_state_is_not_written_back() {
        let storage = MemoryStorage::new();
        storage.insert("prefs", r#"{"version":0,"payload":{"theme":"dark","volume":5}}"#);
        let (_store, persist) = build(PersistOptions::new("prefs").storage(storage.clone()));

        persist.wait_for_hydration().await;
        persist.flush().await;

        assert_eq!(storage.writes(), 0);
    }

    struct BrokenStorage;

    #[async_trait]
    impl StorageAdapter for BrokenStorage {
        async fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        async fn set_item(&self, _key: &str, _value: String) -> Result<(), StorageError> {
            Err(StorageError::Io("disk full".to_string()))
        }

        async fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn storage_failure_disables_persistence() {
        let (store, persist) = build(PersistOptions::new("prefs").storage(BrokenStorage));
        let mut errors = persist.errors();
        persist.wait_for_hydration().await;

        store.update(|p| Prefs { volume: 1, ..p.clone() }).unwrap();
        persist.flush().await;

        assert_eq!(
            errors.recv().await.unwrap(),
            PersistError::Storage(StorageError::Io("disk full".to_string()))
        );
        assert!(!persist.is_enabled());

        // the store keeps working in memory
        store.update(|p| Prefs { volume: 2, ..p.clone() }).unwrap();
        assert_eq!(store.get_state().volume, 2);
        persist.flush().await;
    }

    #[tokio::test]
    async fn absent_storage_is_unavailable() {
        let (store, persist) = build(PersistOptions::new("prefs"));

        assert!(persist.has_hydrated());
        assert_eq!(persist.hydration_outcome(), Some(HydrationOutcome::Unavailable));
        assert!(!persist.is_enabled());

        store.update(|p| Prefs { volume: 1, ..p.clone() }).unwrap();
        persist.flush().await;
        assert!(persist.clear_storage().await.is_err());
    }

    #[tokio::test]
    async fn skip_hydration_waits_for_rehydrate() {
        let storage = MemoryStorage::new();
        storage.insert("prefs", r#"{"version":0,"payload":{"volume":9}}"#);
        let (store, persist) = build(
            PersistOptions::new("prefs")
                .skip_hydration(true)
                .storage(storage.clone()),
        );

        tokio::task::yield_now().await;
        assert!(!persist.has_hydrated());
        assert_eq!(store.get_state().volume, 5);

        assert_eq!(persist.rehydrate().await, HydrationOutcome::Restored);
        assert_eq!(persist.wait_for_hydration().await, HydrationOutcome::Restored);
        assert_eq!(store.get_state().volume, 9);
    }

    #[tokio::test]
    async fn clear_storage_removes_record() {
        let storage = MemoryStorage::new();
        let (store, persist) = build(PersistOptions::new("prefs").storage(storage.clone()));
        persist.wait_for_hydration().await;

        store.update(|p| Prefs { volume: 1, ..p.clone() }).unwrap();
        persist.flush().await;
        assert!(storage.get("prefs").is_some());

        persist.clear_storage().await.unwrap();
        assert!(storage.get("prefs").is_none());

        store.update(|p| Prefs { volume: 2, ..p.clone() }).unwrap();
        persist.flush().await;
        assert_eq!(stored(&storage, "prefs")["payload"]["volume"], json!(2));
    }

    #[tokio::test]
    async fn custom_merge_is_used() {
        let storage = MemoryStorage::new();
        storage.insert("prefs", r#"{"version":0,"payload":{"theme":"dark","volume":9}}"#);
        let (store, persist) = build(
            PersistOptions::new("prefs")
                .storage(storage.clone())
                .merge(|payload, current: &Prefs| {
                    // only the theme is trusted from storage
                    let theme = payload
                        .get("theme")
                        .and_then(Value::as_str)
                        .unwrap_or(&current.theme)
                        .to_string();
                    Ok(Prefs {
                        theme,
                        ..current.clone()
                    })
                }),
        );

        persist.wait_for_hydration().await;
        assert_eq!(
            *store.get_state(),
            Prefs {
                theme: "dark".to_string(),
                volume: 5
            }
        );
    }

    #[tokio::test]
    async fn no_op_updates_are_not_written() {
        let storage = MemoryStorage::new();
        let (store, persist) = build(PersistOptions::new("prefs").storage(storage.clone()));
        persist.wait_for_hydration().await;

        store.update(|p| p.clone()).unwrap();
        store.replace(prefs()).unwrap();
        persist.flush().await;

        assert_eq!(storage.writes(), 0);
        assert!(storage.get("prefs").is_none());
    }

    #[tokio::test]
    async fn failed_merge_does_not_suppress_later_writes() {
        let storage = MemoryStorage::new();
        storage.insert("prefs", r#"{"version":0,"payload":{"theme":"dark","volume":5}}"#);
        let (store, persist) = build(
            PersistOptions::new("prefs")
                .storage(storage.clone())
                .merge(|_, _: &Prefs| Err(StoreError::Deserialize("rejected".to_string()))),
        );

        assert_eq!(persist.wait_for_hydration().await, HydrationOutcome::Discarded);
        assert_eq!(*store.get_state(), prefs());

        // matches the discarded record, but was never applied from it
        store.update(|p| Prefs { theme: "dark".to_string(), ..p.clone() }).unwrap();
        persist.flush().await;

        assert_eq!(storage.writes(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn hydration_completes_while_another_thread_updates() {
        let storage = MemoryStorage::new();
        storage.insert("prefs", r#"{"version":0,"payload":{"theme":"dark"}}"#);
        let (store, persist) = build(PersistOptions::new("prefs").storage(storage.clone()));
        let _slow = store.subscribe(|_, _| std::thread::sleep(std::time::Duration::from_millis(5)));

        let busy = store.clone();
        let writer = std::thread::spawn(move || {
            for volume in 10..20u8 {
                busy.update(move |p| Prefs { volume, ..p.clone() }).unwrap();
            }
        });

        assert_eq!(persist.wait_for_hydration().await, HydrationOutcome::Restored);
        // the merged state is installed before the outcome is reported
        assert_eq!(store.get_state().theme, "dark");

        writer.join().unwrap();
        assert_eq!(
            *store.get_state(),
            Prefs {
                theme: "dark".to_string(),
                volume: 19
            }
        );
    }

    #[test]
    fn empty_name_is_rejected() {
        let result = Store::builder(prefs())
            .with(Persist::new(PersistOptions::new("  ")))
            .build();
        assert!(matches!(result, Err(BuildError::InvalidConfig(_))));
    }

    #[test]
    fn storage_outside_runtime_is_rejected() {
        let result = Store::builder(prefs())
            .with(Persist::new(
                PersistOptions::new("").storage(MemoryStorage::new()),
            ))
            .build();
        match result {
            Err(BuildError::InvalidConfig(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn explicit_runtime_is_used() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let storage = MemoryStorage::new();
        storage.insert("prefs", r#"{"version":0,"payload":{"volume":7}}"#);

        let store = Store::builder(prefs())
            .with(Persist::new(
                PersistOptions::new("prefs")
                    .storage(storage.clone())
                    .runtime(runtime.handle().clone()),
            ))
            .build()
            .unwrap();
        let persist = store.persist().unwrap();

        let outcome = runtime.block_on(persist.wait_for_hydration());
        assert_eq!(outcome, HydrationOutcome::Restored);
        assert_eq!(store.get_state().volume, 7);
    }
}
