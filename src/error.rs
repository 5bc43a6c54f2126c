use thiserror::Error;

/// Outcome of a single script evaluation.
pub type ScriptResult = Result<serde_json::Value, ExecError>;

/// Reason a script evaluation produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("script size exceeds maximum limit")]
    ScriptTooLarge,

    #[error("no worker available to process script")]
    NoWorkerAvailable,

    /// The admission gate is closed; only the request adapter produces this.
    #[error("currently not accepting scripts, please wait...")]
    NotAccepting,

    #[error("script execution timed out")]
    Timeout,

    /// Evaluation was cancelled from outside the deadline path, e.g. by the
    /// memory watchdog or during shutdown.
    #[error("script cancelled")]
    Interrupted,

    #[error("script execution failed: {0}")]
    Engine(String),
}
