//! VM construction and the capability strip applied to every fresh VM.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rquickjs::{CatchResultExt, Context, Runtime, Value};
use tracing::debug;

use crate::error::ExecError;

/// Identifiers rebound to `undefined` at global scope on every fresh VM
/// before evaluation, shadowing any engine-provided binding. Additions
/// require a code change; the list is part of the trust contract with
/// scripts.
pub const RESTRICTED_GLOBALS: &[&str] = &[
    "eval",
    "process",
    "child_process",
    "require",
    "global",
    "globalThis",
    "window",
    "self",
    "module",
    "exports",
    "__dirname",
    "__filename",
    "XMLHttpRequest",
    "fetch",
    "WebSocket",
    "Object.defineProperty",
    "Object.create",
    "Proxy",
    "exec",
    "execSync",
    "spawn",
    "fs",
    "FileSystem",
    "writeFile",
    "readFile",
    "Runtime.getRuntime",
    "setInterval",
    "setTimeout",
    "setImmediate",
    "crypto",
    "randomBytes",
    "document",
    "alert",
    "confirm",
    "prompt",
];

/// Cheap, thread-safe interrupt trigger for one VM.
///
/// The engine polls the trigger between interpreter steps; once set, the
/// running evaluation fails at the next yield point. Setting it again is a
/// no-op.
#[derive(Clone, Default)]
pub struct VmHandle {
    triggered: Arc<AtomicBool>,
}

impl VmHandle {
    /// Ask the engine to abort the current evaluation.
    ///
    /// The reason is diagnostic only; the caller that interrupted decides
    /// how the outcome is reported.
    pub fn interrupt(&self, reason: &str) {
        debug!(reason, "interrupting script");
        self.triggered.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Relaxed)
    }
}

/// An isolated evaluator for one script.
///
/// Single-owner for its lifetime: exactly one evaluation task holds the VM,
/// while any number of [`VmHandle`] clones may interrupt it from outside.
pub struct Vm {
    _runtime: Runtime,
    context: Context,
    handle: VmHandle,
}

impl Vm {
    /// Build a fresh VM with the capability strip applied.
    pub fn new() -> Result<Self, ExecError> {
        let runtime = Runtime::new()
            .map_err(|e| ExecError::Engine(format!("failed to create runtime: {e}")))?;

        let handle = VmHandle::default();
        let trigger = handle.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || trigger.is_triggered())));

        let context = Context::full(&runtime)
            .map_err(|e| ExecError::Engine(format!("failed to create context: {e}")))?;

        context
            .with(|ctx| {
                let globals = ctx.globals();
                for name in RESTRICTED_GLOBALS {
                    globals.set(*name, rquickjs::Undefined)?;
                }
                Ok::<(), rquickjs::Error>(())
            })
            .map_err(|e| ExecError::Engine(format!("failed to restrict globals: {e}")))?;

        Ok(Self {
            _runtime: runtime,
            context,
            handle,
        })
    }

    /// Interrupt trigger for this VM; safe to hold after the VM is gone.
    pub fn handle(&self) -> VmHandle {
        self.handle.clone()
    }

    /// Evaluate the source and export the value of its final expression.
    ///
    /// Blocks the calling thread for the duration of the evaluation; the
    /// only way to bound it from outside is [`VmHandle::interrupt`].
    pub fn evaluate(&self, source: &[u8]) -> Result<serde_json::Value, String> {
        self.context.with(|ctx| {
            ctx.eval::<Value, _>(source)
                .catch(&ctx)
                .map(|value| export_value(&value))
                .map_err(|e| e.to_string())
        })
    }
}

/// Deepest structure the exporter will walk; anything beyond (including
/// cyclic objects) flattens to null.
const MAX_EXPORT_DEPTH: usize = 64;

/// Export an engine value as JSON. Values with no JSON counterpart
/// (undefined, functions, symbols) export as null.
fn export_value(value: &Value) -> serde_json::Value {
    export_value_inner(value, 0)
}

fn export_value_inner(value: &Value, depth: usize) -> serde_json::Value {
    use serde_json::Value as Json;

    if depth > MAX_EXPORT_DEPTH {
        return Json::Null;
    }
    if value.is_null() || value.is_undefined() {
        return Json::Null;
    }
    if let Some(b) = value.as_bool() {
        return Json::Bool(b);
    }
    if let Some(i) = value.as_int() {
        return Json::from(i);
    }
    if let Some(f) = value.as_float() {
        return serde_json::Number::from_f64(f)
            .map(Json::Number)
            .unwrap_or(Json::Null);
    }
    if let Some(s) = value.as_string() {
        return s.to_string().map(Json::String).unwrap_or(Json::Null);
    }
    if let Some(array) = value.as_array() {
        let items = array
            .iter::<Value>()
            .map(|item| {
                item.map(|v| export_value_inner(&v, depth + 1))
                    .unwrap_or(Json::Null)
            })
            .collect();
        return Json::Array(items);
    }
    if let Some(object) = value.as_object() {
        let mut map = serde_json::Map::new();
        for prop in object.props::<String, Value>() {
            if let Ok((key, item)) = prop {
                map.insert(key, export_value_inner(&item, depth + 1));
            }
        }
        return Json::Object(map);
    }
    // Functions, symbols, and the like.
    Json::Null
}
