//! Runtime instance: value stack, native call frames and the raw call primitives
//!
//! Stack positions are 1-based and relative to the innermost active native
//! frame, so a native function sees its arguments at `1..=top()` no matter
//! how deep it was called from.

use crate::protected::marshal::panic_message;
use crate::protected::CallStatus;
use crate::reference::Reference;
use crate::value::{RuntimeError, Value};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tether_config::RuntimeConfig;

/// Request every result a call produces
pub const MULTRET: usize = usize::MAX;

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a runtime instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(u64);

/// Runtime instance
///
/// All operations take `&mut self`, so one instance is driven strictly
/// sequentially. Distinct instances share nothing and may live on different
/// threads.
#[derive(Debug)]
pub struct State {
    id: StateId,
    stack: Vec<Value>,
    /// Absolute stack offset of the first slot of each active native frame
    frames: Vec<usize>,
    globals: HashMap<String, Value>,
    default_handler: Reference,
    config: RuntimeConfig,
}

impl State {
    /// Create a runtime with default configuration
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            id: StateId(NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed)),
            stack: Vec::new(),
            frames: Vec::new(),
            globals: HashMap::new(),
            default_handler: Reference::empty(),
            config,
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Error handler slot
    // ------------------------------------------------------------------

    /// Error handler copied into every protected function created from this
    /// runtime. Empty until set.
    pub fn default_handler(&self) -> &Reference {
        &self.default_handler
    }

    /// Replace the default error handler. An empty reference means "no handler".
    pub fn set_default_handler(&mut self, handler: Reference) {
        self.default_handler = handler;
    }

    // ------------------------------------------------------------------
    // Stack introspection
    // ------------------------------------------------------------------

    fn base(&self) -> usize {
        self.frames.last().copied().unwrap_or(0)
    }

    fn absolute(&self, index: usize) -> Option<usize> {
        if index == 0 || index > self.top() {
            None
        } else {
            Some(self.base() + index - 1)
        }
    }

    /// Number of values in the current frame (index of the top value)
    pub fn top(&self) -> usize {
        self.stack.len() - self.base()
    }

    /// Truncate the current frame to `top` values, padding with nil when growing
    pub fn set_top(&mut self, top: usize) {
        let len = self.base() + top;
        self.stack.resize(len, Value::Nil);
    }

    /// Number of active native frames
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Values of the current frame, bottom first
    pub fn args(&self) -> &[Value] {
        &self.stack[self.base()..]
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.absolute(index).map(|abs| &self.stack[abs])
    }

    pub fn push_value(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop_value(&mut self) -> Option<Value> {
        if self.top() == 0 {
            None
        } else {
            self.stack.pop()
        }
    }

    /// Insert a value at `index`, shifting the values above it up.
    ///
    /// Indices past the top are clamped to `top() + 1`.
    pub fn insert(&mut self, index: usize, value: Value) {
        let index = index.clamp(1, self.top() + 1);
        let abs = self.base() + index - 1;
        self.stack.insert(abs, value);
    }

    /// Remove the value at `index`, shifting the values above it down.
    pub fn remove(&mut self, index: usize) -> Option<Value> {
        let abs = self.absolute(index)?;
        Some(self.stack.remove(abs))
    }

    /// `count` values starting at `index`
    pub(crate) fn slice(&self, index: usize, count: usize) -> &[Value] {
        match self.absolute(index) {
            Some(abs) => {
                let end = (abs + count).min(self.stack.len());
                &self.stack[abs..end]
            }
            None => &[],
        }
    }

    /// Remove `count` values starting at `index`
    pub(crate) fn drain(&mut self, index: usize, count: usize) -> Vec<Value> {
        match self.absolute(index) {
            Some(abs) => {
                let end = (abs + count).min(self.stack.len());
                self.stack.drain(abs..end).collect()
            }
            None => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Push a global (nil when undefined)
    pub fn push_global(&mut self, name: &str) {
        let value = self.globals.get(name).cloned().unwrap_or_default();
        self.stack.push(value);
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// Absolute position of a callee sitting below `nargs` arguments
    fn callee(&self, nargs: usize) -> Result<usize, RuntimeError> {
        if self.top() < nargs + 1 {
            return Err(RuntimeError::message(format!(
                "not enough values on the stack for a call with {} argument{}",
                nargs,
                if nargs == 1 { "" } else { "s" }
            )));
        }
        Ok(self.stack.len() - nargs - 1)
    }

    /// Call the value below the top `nargs` values.
    ///
    /// Errors propagate to the caller as `Err` after the callee and its
    /// arguments are removed. Panics raised by native functions are not
    /// caught.
    pub fn call(&mut self, nargs: usize, nresults: usize) -> Result<(), RuntimeError> {
        let func = self.callee(nargs)?;
        self.invoke(func, nresults)
    }

    /// Protected call primitive.
    ///
    /// Calls the value below the top `nargs` values and returns a raw status
    /// code (see [`CallStatus::from_code`]). On success the callee and
    /// arguments are replaced by `nresults` results (all of them for
    /// [`MULTRET`]). On a runtime error, if `handler` is a valid stack index,
    /// the value there is called with the error value and its result replaces
    /// it; either way exactly one error value is left in place of the callee.
    /// A handler that fails or panics yields [`CallStatus::Handler`] with its
    /// error as that value.
    ///
    /// Panics raised by the callee unwind through this call after the callee
    /// and arguments have been removed.
    pub fn pcall(&mut self, nargs: usize, nresults: usize, handler: usize) -> i32 {
        let func = match self.callee(nargs) {
            Ok(func) => func,
            Err(err) => {
                self.stack.push(err.into_value());
                return CallStatus::Runtime.code();
            }
        };

        let handler = if handler == 0 {
            None
        } else {
            let value = self.get(handler).cloned();
            if value.is_none() {
                tracing::warn!(handler, "error handler index is not a valid stack slot");
            }
            value
        };

        let err = match self.invoke(func, nresults) {
            Ok(()) => return CallStatus::Ok.code(),
            Err(err) => err,
        };

        self.stack.truncate(func);
        let status = err.status();
        let payload = err.into_value();

        match handler {
            Some(handler) if status == CallStatus::Runtime => {
                self.stack.push(handler);
                self.stack.push(payload);
                let handled = panic::catch_unwind(AssertUnwindSafe(|| self.invoke(func, 1)));
                let failure = match handled {
                    Ok(Ok(())) => return status.code(),
                    Ok(Err(handler_err)) => handler_err.into_value(),
                    Err(panic_payload) => Value::string(panic_message(panic_payload.as_ref())),
                };
                self.stack.truncate(func);
                self.stack.push(failure);
                CallStatus::Handler.code()
            }
            _ => {
                self.stack.push(payload);
                status.code()
            }
        }
    }

    /// Run the function at absolute position `func` with everything above it
    /// as arguments.
    fn invoke(&mut self, func: usize, nresults: usize) -> Result<(), RuntimeError> {
        let native = match &self.stack[func] {
            Value::Function(function) => function.native(),
            other => {
                let msg = format!("attempt to call a {} value", other.type_name());
                self.stack.truncate(func);
                return Err(RuntimeError::type_error(msg));
            }
        };

        if self.frames.len() >= self.config.max_call_depth {
            self.stack.truncate(func);
            return Err(RuntimeError::message("stack overflow"));
        }
        if self.stack.len() > self.config.max_stack_slots {
            self.stack.truncate(func);
            return Err(RuntimeError::Memory("not enough memory".to_string()));
        }

        self.frames.push(func + 1);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| native(self)));
        self.frames.pop();

        let produced = match outcome {
            Ok(Ok(produced)) => produced,
            Ok(Err(err)) => {
                self.stack.truncate(func);
                return Err(err);
            }
            Err(payload) => {
                // Leave the stack as it was before the call, then keep unwinding.
                self.stack.truncate(func);
                tracing::trace!(depth = self.frames.len(), "native panic unwinding through frame");
                panic::resume_unwind(payload);
            }
        };

        let available = self.stack.len().saturating_sub(func + 1);
        let first = self.stack.len() - produced.min(available);
        let results: Vec<Value> = self.stack.drain(first..).collect();
        self.stack.truncate(func);
        self.stack.extend(results);
        if nresults != MULTRET {
            self.stack.resize(func + nresults, Value::Nil);
        }
        Ok(())
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}
