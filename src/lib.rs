//! Sandboxed execution service for untrusted JavaScript.
//!
//! Scripts arrive over a small HTTP surface and are evaluated inside
//! isolated, capability-stripped QuickJS VMs. A bounded worker pool caps
//! concurrency, every evaluation races a deadline and an external cancel
//! trigger, and a process-wide memory watchdog couples heap pressure to
//! request admission, escalating to a self-restart when pressure persists.
//!
//! The value of the script's final expression is what comes back:
//!
//! ```text
//! var x = 20;
//! x;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod logging;
pub mod manager;
pub mod registry;
pub mod server;
pub mod vm;
pub mod watchdog;

pub use config::Config;
pub use error::{ExecError, ScriptResult};
pub use executor::Executor;
pub use lifecycle::Shutdown;
pub use manager::{ScriptJob, ScriptManager};
pub use registry::{Registry, RunningScript};
pub use server::{AppState, ScriptResponse, TlsFiles};
pub use vm::{Vm, VmHandle, RESTRICTED_GLOBALS};
pub use watchdog::{MemorySampler, ProcessRssSampler, Watchdog, WatchdogTuning};
