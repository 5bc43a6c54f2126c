//! Authoritative map of running scripts and their interrupt handles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::vm::VmHandle;

/// State tracked for one in-flight evaluation.
pub struct RunningScript {
    /// Interrupt trigger for the VM owned by the evaluation task.
    pub vm: VmHandle,
    /// Cancels the executor's race, closing the evaluation early.
    pub cancel: CancellationToken,
    /// Original source, kept for diagnostic logs only.
    pub source: Bytes,
}

/// Registry of everything that can currently be interrupted.
///
/// An entry exists iff an evaluation task is live. Id allocation is atomic
/// and ids are never reused for the lifetime of the process.
#[derive(Default)]
pub struct Registry {
    scripts: Mutex<HashMap<String, RunningScript>>,
    counter: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next script id.
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("script-{n}")
    }

    /// Track an evaluation; must happen before the evaluation starts.
    pub fn register(&self, id: &str, info: RunningScript) {
        self.scripts
            .lock()
            .expect("running-script map poisoned")
            .insert(id.to_string(), info);
    }

    /// Stop tracking an evaluation. Returns false if the entry was already
    /// removed, e.g. by a concurrent `cancel_all`.
    pub fn unregister(&self, id: &str) -> bool {
        self.scripts
            .lock()
            .expect("running-script map poisoned")
            .remove(id)
            .is_some()
    }

    /// Interrupt every tracked script and clear the map.
    ///
    /// Does not wait for the evaluators to finish; they have been told to
    /// stop and will observe their cancel tokens. An evaluator's own
    /// unregister racing this removal is a benign no-op.
    pub fn cancel_all(&self) {
        let mut scripts = self.scripts.lock().expect("running-script map poisoned");
        for (id, entry) in scripts.drain() {
            warn!(script_id = %id, script_length = entry.source.len(), "cancelling script");
            entry.vm.interrupt("script cancelled");
            entry.cancel.cancel();
        }
        warn!("all scripts cancelled");
    }

    pub fn len(&self) -> usize {
        self.scripts
            .lock()
            .expect("running-script map poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
