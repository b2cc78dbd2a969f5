use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use crate::task_key::TaskKey;

struct JobHandle {
    cancel: CancellationToken,
    generation: u64,
}

/// Handed out by [`TaskRegistry::try_begin`] for a job that is registered but
/// not yet running. Whoever holds it is the only party allowed to start work
/// for the key.
#[derive(Debug)]
pub struct StartToken {
    key: TaskKey,
    cancel: CancellationToken,
}

impl StartToken {
    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[derive(Debug)]
pub enum BeginOutcome {
    AlreadyRunning,
    Started(StartToken),
}

/// Map from task identity to its cancellable job, plus the keys whose pending
/// cancellation means "discard" rather than "pause".
#[derive(Default)]
pub struct TaskRegistry {
    jobs: Mutex<HashMap<TaskKey, JobHandle>>,
    deletion_intents: Mutex<HashSet<TaskKey>>,
    next_generation: AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job for `key` unless one is already there.
    pub fn try_begin(&self, key: &TaskKey) -> BeginOutcome {
        let mut jobs = self.jobs.lock();
        match jobs.entry(key.clone()) {
            Entry::Occupied(_) => BeginOutcome::AlreadyRunning,
            Entry::Vacant(vacant) => {
                let cancel = CancellationToken::new();
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
                vacant.insert(JobHandle {
                    cancel: cancel.clone(),
                    generation,
                });
                debug!(%key, generation, "job registered");
                BeginOutcome::Started(StartToken {
                    key: key.clone(),
                    cancel,
                })
            }
        }
    }

    /// Signal the job for `key`. Returns whether there was one.
    pub fn cancel(&self, key: &TaskKey) -> bool {
        match self.jobs.lock().get(key) {
            Some(handle) => {
                debug!(%key, generation = handle.generation, "job cancel requested");
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn end(&self, key: &TaskKey) {
        if self.jobs.lock().remove(key).is_some() {
            debug!(%key, "job removed");
        }
    }

    /// Called by a job on its way out: removes its handle and any deletion
    /// intent it never observed, together, so a later job cannot inherit it.
    /// Returns whether an intent was discarded.
    pub fn finish(&self, key: &TaskKey) -> bool {
        let mut jobs = self.jobs.lock();
        let mut intents = self.deletion_intents.lock();
        jobs.remove(key);
        let stale = intents.remove(key);
        if stale {
            debug!(%key, "discarded deletion intent of finished job");
        }
        stale
    }

    pub fn is_running(&self, key: &TaskKey) -> bool {
        self.jobs.lock().contains_key(key)
    }

    pub fn running_keys(&self) -> Vec<TaskKey> {
        self.jobs.lock().keys().cloned().collect()
    }

    pub fn mark_for_deletion(&self, key: &TaskKey) {
        self.deletion_intents.lock().insert(key.clone());
    }

    /// Consume the deletion intent for `key`, if any.
    pub fn take_deletion_intent(&self, key: &TaskKey) -> bool {
        self.deletion_intents.lock().remove(key)
    }

    pub fn has_deletion_intent(&self, key: &TaskKey) -> bool {
        self.deletion_intents.lock().contains(key)
    }
}
