//! Runtime value representation
//!
//! Values are cheap to clone:
//! - Nil, Bool, Number: immediate values
//! - String: reference-counted, immutable (`Arc<str>`)
//! - Function: reference-counted native closure, compared by identity

use crate::protected::CallStatus;
use crate::state::State;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Native function signature.
///
/// Arguments occupy indices `1..=state.top()` of the callee's frame. The
/// function pushes its results and returns how many of the topmost values
/// are results.
pub type NativeFn = Arc<dyn Fn(&mut State) -> Result<usize, RuntimeError> + Send + Sync>;

/// A callable runtime value
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    func: NativeFn,
}

impl Function {
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&mut State) -> Result<usize, RuntimeError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn native(&self) -> NativeFn {
        Arc::clone(&self.func)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name)
    }
}

/// Runtime value
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Function(Function),
}

impl Value {
    /// Name of the value's type, as used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Function(func) => write!(f, "function: {}", func.name),
        }
    }
}

/// Error raised inside the runtime.
///
/// Native functions return these instead of unwinding; the protected-call
/// primitive turns them into a status code plus an error value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// Arbitrary error value raised by a function
    #[error("{0}")]
    Raised(Value),
    /// Type error (calling a non-function, bad argument)
    #[error("{msg}")]
    TypeError { msg: String },
    /// Malformed input handed to the runtime
    #[error("{0}")]
    Syntax(String),
    /// Allocation or stack limit exceeded
    #[error("{0}")]
    Memory(String),
}

impl RuntimeError {
    /// Raise a string message
    pub fn message(msg: impl Into<String>) -> Self {
        RuntimeError::Raised(Value::String(Arc::from(msg.into())))
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        RuntimeError::TypeError { msg: msg.into() }
    }

    /// Status a protected call reports for this error
    pub fn status(&self) -> CallStatus {
        match self {
            RuntimeError::Raised(_) | RuntimeError::TypeError { .. } => CallStatus::Runtime,
            RuntimeError::Syntax(_) => CallStatus::Syntax,
            RuntimeError::Memory(_) => CallStatus::Memory,
        }
    }

    /// The value left on the stack for this error
    pub fn into_value(self) -> Value {
        match self {
            RuntimeError::Raised(value) => value,
            RuntimeError::TypeError { msg } | RuntimeError::Syntax(msg) | RuntimeError::Memory(msg) => {
                Value::String(Arc::from(msg))
            }
        }
    }
}
