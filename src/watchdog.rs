//! Periodic heap sampler driving admission, cancellation, and restart.

use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::manager::ScriptManager;

/// Source of process heap samples.
///
/// The watchdog only needs a monotonic-ish "bytes in use" figure; tests
/// substitute a fake.
pub trait MemorySampler: Send + 'static {
    fn current_allocated_bytes(&mut self) -> u64;
}

/// RSS of the current process, polled through sysinfo.
pub struct ProcessRssSampler {
    system: System,
    pid: Pid,
}

impl ProcessRssSampler {
    pub fn new() -> anyhow::Result<Self> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| anyhow::anyhow!("failed to resolve current pid: {e}"))?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }
}

impl MemorySampler for ProcessRssSampler {
    fn current_allocated_bytes(&mut self) -> u64 {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        self.system
            .process(self.pid)
            .map(|process| process.memory())
            .unwrap_or(0)
    }
}

/// Timing knobs for the watchdog loop. Production uses the defaults; tests
/// compress them.
#[derive(Debug, Clone, Copy)]
pub struct WatchdogTuning {
    /// How often the heap is sampled.
    pub sample_interval: Duration,
    /// Delay between observing recovery and reopening the admission gate.
    pub settle_delay: Duration,
    /// Sustained overage after which the watchdog escalates to restart.
    pub restart_after: Duration,
}

impl Default for WatchdogTuning {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(100),
            settle_delay: Duration::from_secs(10),
            restart_after: Duration::from_secs(60),
        }
    }
}

/// Memory watchdog: closes the admission gate and cancels all scripts on
/// overage, reopens after recovery settles, and escalates to a process
/// restart when overage persists.
pub struct Watchdog;

impl Watchdog {
    /// Launch the watchdog loop.
    ///
    /// `escalate` is the restart capability: one message is sent when
    /// memory has stayed above the limit for `restart_after`, after which
    /// the loop ends and the lifecycle controller takes over.
    pub fn spawn(
        manager: Arc<ScriptManager>,
        limit_bytes: u64,
        sampler: impl MemorySampler,
        tuning: WatchdogTuning,
        escalate: mpsc::Sender<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(run(manager, limit_bytes, sampler, tuning, escalate))
    }
}

async fn run(
    manager: Arc<ScriptManager>,
    limit_bytes: u64,
    mut sampler: impl MemorySampler,
    tuning: WatchdogTuning,
    escalate: mpsc::Sender<()>,
) {
    let mut over_since: Option<Instant> = None;

    loop {
        tokio::time::sleep(tuning.sample_interval).await;
        let allocated = sampler.current_allocated_bytes();

        if allocated > limit_bytes {
            if manager.is_accepting() {
                manager.set_accepting(false);
                warn!(
                    usage_mb = allocated >> 20,
                    limit_mb = limit_bytes >> 20,
                    "memory usage exceeded limit, cancelling all scripts"
                );
                manager.registry().cancel_all();
            }
            // Interrupted evaluators drop their VMs; that is the engine-heap
            // release path.
            let started = *over_since.get_or_insert_with(Instant::now);
            if started.elapsed() > tuning.restart_after {
                error!(
                    overage = ?started.elapsed(),
                    "memory limit exceeded for too long, requesting restart"
                );
                let _ = escalate.send(()).await;
                return;
            }
        } else if over_since.take().is_some() {
            info!(
                settle = ?tuning.settle_delay,
                "memory usage back to normal, resuming script execution after settling"
            );
            tokio::time::sleep(tuning.settle_delay).await;
            manager.set_accepting(true);
        }
    }
}
