//! Runs one evaluation against a deadline and an external cancel trigger.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{ExecError, ScriptResult};
use crate::registry::{Registry, RunningScript};
use crate::vm::Vm;

/// Evaluates scripts on background tasks, racing each against its deadline
/// and the registry's cancel trigger.
pub struct Executor {
    registry: Arc<Registry>,
    max_script_size: usize,
}

impl Executor {
    pub fn new(registry: Arc<Registry>, max_script_size: usize) -> Self {
        Self {
            registry,
            max_script_size,
        }
    }

    /// Evaluate `source`, returning by `deadline` at the latest.
    ///
    /// The evaluation itself runs on a blocking task that sends exactly one
    /// result. When the deadline or the cancel trigger fires first, the VM
    /// is interrupted and the result channel drained before returning, so
    /// the evaluation task never outlives its reply unobserved. The
    /// cancellation reason wins over whatever the engine reports after the
    /// interrupt; a value that completed just before the interrupt was
    /// observed is returned as a success.
    pub async fn execute(&self, source: Bytes, deadline: Instant) -> ScriptResult {
        // Size is re-checked here: the executor is the trust boundary for
        // in-process callers, not just the request adapter.
        if source.len() > self.max_script_size {
            warn!("script size exceeds maximum limit");
            return Err(ExecError::ScriptTooLarge);
        }

        let vm = Vm::new()?;
        let handle = vm.handle();

        let id = self.registry.next_id();
        let cancel = CancellationToken::new();
        self.registry.register(
            &id,
            RunningScript {
                vm: handle.clone(),
                cancel: cancel.clone(),
                source: source.clone(),
            },
        );

        let (tx, mut rx) = oneshot::channel();
        let registry = Arc::clone(&self.registry);
        let script_id = id.clone();
        tokio::task::spawn_blocking(move || {
            let outcome = match vm.evaluate(&source) {
                Ok(value) => {
                    info!(script_id = %script_id, "script completed successfully");
                    Ok(value)
                }
                Err(detail) => {
                    error!(script_id = %script_id, error = %detail, "script execution failed");
                    Err(ExecError::Engine(detail))
                }
            };
            let _ = tx.send(outcome);
            registry.unregister(&script_id);
        });

        tokio::select! {
            biased;
            result = &mut rx => harvest(result),
            _ = tokio::time::sleep_until(deadline) => {
                warn!(script_id = %id, "interrupting script, deadline expired");
                handle.interrupt("script execution timed out");
                let _ = (&mut rx).await;
                Err(ExecError::Timeout)
            }
            _ = cancel.cancelled() => {
                warn!(script_id = %id, "interrupting script, cancellation requested");
                handle.interrupt("script cancelled");
                let _ = (&mut rx).await;
                Err(ExecError::Interrupted)
            }
        }
    }
}

fn harvest(result: Result<ScriptResult, oneshot::error::RecvError>) -> ScriptResult {
    result.unwrap_or_else(|_| {
        Err(ExecError::Engine(
            "evaluator task terminated without a result".to_string(),
        ))
    })
}
