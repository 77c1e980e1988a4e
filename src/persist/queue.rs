//! Latest-wins write queue between the store and the persistence task.
//!
//! The queue holds at most one pending job. A job pushed while another is
//! pending replaces it; the job already handed to the task is never
//! interrupted. Every job gets a sequence number and the task reports the
//! highest settled number, which is what `flush` waits on.

use crate::core::store::lock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::{watch, Notify};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Job {
    Write(String),
    Remove,
}

struct Slot {
    pending: Option<(u64, Job)>,
    closed: bool,
}

pub(crate) struct WriteQueue {
    slot: Mutex<Slot>,
    wake: Notify,
    enqueued: AtomicU64,
    settled: watch::Sender<u64>,
}

impl WriteQueue {
    pub(crate) fn new() -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            slot: Mutex::new(Slot {
                pending: None,
                closed: false,
            }),
            wake: Notify::new(),
            enqueued: AtomicU64::new(0),
            settled,
        }
    }

    /// Queue a job, replacing any job still pending. Returns its sequence
    /// number, or `None` once the queue is closed.
    pub(crate) fn push(&self, job: Job) -> Option<u64> {
        let seq = {
            let mut slot = lock(&self.slot);
            if slot.closed {
                return None;
            }
            let seq = self.enqueued.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((superseded, _)) = slot.pending.replace((seq, job)) {
                tracing::trace!(superseded, seq, "pending write superseded");
            }
            seq
        };
        self.wake.notify_one();
        Some(seq)
    }

    /// Next job to run; `None` once the queue is closed and empty.
    pub(crate) async fn next(&self) -> Option<(u64, Job)> {
        loop {
            {
                let mut slot = lock(&self.slot);
                if let Some(job) = slot.pending.take() {
                    return Some(job);
                }
                if slot.closed {
                    return None;
                }
            }
            self.wake.notified().await;
        }
    }

    /// Mark every job up to `seq` as settled.
    pub(crate) fn settle(&self, seq: u64) {
        self.settled.send_modify(|settled| *settled = (*settled).max(seq));
    }

    /// Settle everything queued so far, whether or not it ran.
    pub(crate) fn settle_all(&self) {
        self.settle(self.enqueued.load(Ordering::SeqCst));
    }

    pub(crate) fn close(&self) {
        lock(&self.slot).closed = true;
        self.wake.notify_one();
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.slot).closed
    }

    /// Wait until every job queued before this call has settled.
    pub(crate) async fn flush(&self) {
        let target = self.enqueued.load(Ordering::SeqCst);
        let mut settled = self.settled.subscribe();
        // the sender lives in `self`, so this only returns once settled
        let _ = settled.wait_for(|seq| *seq >= target).await;
    }
}
