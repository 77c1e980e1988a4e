//! Persistent Counter
//!
//! This example builds a counter store with undo/redo history, file
//! persistence and a devtools log, then walks through a few changes.
//!
//! Key concepts:
//! - Composing middleware in an explicit order
//! - Hydrating from storage and flushing writes
//! - Undo/redo that also reaches storage
//!
//! Run with: RUST_LOG=holdfast=debug cargo run --example counter

use holdfast::middleware::Devtools;
use holdfast::persist::FileStorage;
use holdfast::temporal::{Temporal, TemporalOptions};
use holdfast::{Persist, PersistOptions, Store, Update};
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
struct Counter {
    count: i64,
    step: i64,
}

fn increment(store: &Store<Counter>) {
    store
        .dispatch(
            "increment",
            Update::compute(|c: &Counter| Counter {
                count: c.count + c.step,
                ..c.clone()
            }),
        )
        .unwrap();
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().compact())
        .init();

    println!("=== Persistent Counter Example ===\n");

    let dir = std::env::temp_dir().join("holdfast-counter");
    let store = Store::builder(Counter { count: 0, step: 1 })
        .with(Temporal::new(TemporalOptions::new().max_depth(20).exclude(["step"])))
        .with(Persist::new(
            PersistOptions::new("counter").storage(FileStorage::new(&dir)),
        ))
        .with(Devtools::new("counter"))
        .build()
        .unwrap();

    let persist = store.persist().unwrap();
    let outcome = persist.wait_for_hydration().await;
    println!("Hydration: {outcome:?}");
    println!("Starting at: {:?}\n", store.get_state());

    let _subscription = store.subscribe_with_selector(
        |c: &Counter| c.count,
        |next: &i64, prev: &i64| println!("  count {prev} -> {next}"),
    );

    println!("Incrementing three times:");
    for _ in 0..3 {
        increment(&store);
    }

    let temporal = store.temporal().unwrap();
    println!("\nUndo:");
    temporal.undo().unwrap();
    println!("\nRedo:");
    temporal.redo().unwrap();

    persist.flush().await;
    println!("\nSaved to {}", dir.join("counter.json").display());

    println!("\nDevtools log:");
    for action in store.find::<Devtools>().unwrap().actions() {
        println!("  {} {:?}", action.label, action.changed);
    }

    println!(
        "\nHistory: {} undo step(s), {} redo step(s)",
        temporal.past_len(),
        temporal.future_len()
    );
}
