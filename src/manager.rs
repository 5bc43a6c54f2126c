//! Worker pool, job queue, and the admission gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ExecError, ScriptResult};
use crate::executor::Executor;
use crate::registry::Registry;

/// A submitted work unit: source bytes plus a one-slot reply channel.
///
/// Created by the request adapter, consumed by exactly one worker, and
/// destroyed once the reply is delivered.
pub struct ScriptJob {
    pub source: Bytes,
    pub reply: oneshot::Sender<ScriptResult>,
}

impl ScriptJob {
    /// Create a job and the receiver its result will arrive on.
    pub fn new(source: Bytes) -> (Self, oneshot::Receiver<ScriptResult>) {
        let (reply, rx) = oneshot::channel();
        (Self { source, reply }, rx)
    }
}

enum WorkerExit {
    QueueClosed,
}

/// Owns the worker pool, the bounded job queue, the running-script
/// registry, and the admission flag.
pub struct ScriptManager {
    registry: Arc<Registry>,
    executor: Executor,
    queue: mpsc::Sender<ScriptJob>,
    jobs: Arc<Mutex<mpsc::Receiver<ScriptJob>>>,
    accepting: AtomicBool,
    script_timeout: Duration,
    max_script_size: usize,
}

impl ScriptManager {
    /// Build the manager and launch `worker_pool_size` workers.
    pub fn new(config: &Config) -> Arc<Self> {
        let capacity = config.worker_pool_size.max(1);
        let (queue, jobs) = mpsc::channel(capacity);
        let registry = Arc::new(Registry::new());

        let manager = Arc::new(Self {
            executor: Executor::new(Arc::clone(&registry), config.max_script_size),
            registry,
            queue,
            jobs: Arc::new(Mutex::new(jobs)),
            accepting: AtomicBool::new(true),
            script_timeout: config.script_timeout,
            max_script_size: config.max_script_size,
        });

        for slot in 0..capacity {
            manager.spawn_worker(slot);
        }
        info!(workers = capacity, "script manager started");
        manager
    }

    /// Launch one worker plus the supervisor that replaces it if it panics,
    /// preserving the pool's cardinality. A worker whose queue closed exits
    /// without a replacement.
    fn spawn_worker(self: &Arc<Self>, slot: usize) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let worker = tokio::spawn({
                let manager = Arc::clone(&manager);
                async move { manager.worker_loop(slot).await }
            });
            match worker.await {
                Ok(WorkerExit::QueueClosed) => {
                    debug!(slot, "worker exiting, job queue closed");
                }
                Err(e) if e.is_panic() => {
                    error!(slot, "worker panicked, spawning a replacement");
                    manager.spawn_worker(slot);
                }
                Err(_) => {}
            }
        });
    }

    async fn worker_loop(&self, slot: usize) -> WorkerExit {
        loop {
            let job = {
                let mut jobs = self.jobs.lock().await;
                jobs.recv().await
            };
            let Some(job) = job else {
                return WorkerExit::QueueClosed;
            };

            info!(slot, script_length = job.source.len(), "worker executing script");
            let deadline = Instant::now() + self.script_timeout;
            let result = self.executor.execute(job.source, deadline).await;
            let _ = job.reply.send(result);
        }
    }

    /// Submit a script and await its result.
    ///
    /// The enqueue is non-blocking: a full queue is reported immediately as
    /// [`ExecError::NoWorkerAvailable`], the system's primary backpressure
    /// signal.
    pub async fn execute_with_timeout(&self, source: Bytes) -> ScriptResult {
        if source.len() > self.max_script_size {
            warn!("script size exceeds maximum limit");
            return Err(ExecError::ScriptTooLarge);
        }

        let script_length = source.len();
        let (job, reply) = ScriptJob::new(source);
        match self.queue.try_send(job) {
            Ok(()) => {
                info!(script_length, "script queued for execution");
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("no available worker for script execution");
                return Err(ExecError::NoWorkerAvailable);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("job queue closed, rejecting script");
                return Err(ExecError::NoWorkerAvailable);
            }
        }

        reply.await.unwrap_or_else(|_| {
            Err(ExecError::Engine(
                "worker dropped the reply channel".to_string(),
            ))
        })
    }

    /// Lock-free read of the admission flag.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Relaxed)
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Relaxed);
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Cancel every running script. Used by the watchdog and at shutdown.
    pub fn stop(&self) {
        self.registry.cancel_all();
    }
}
