//! Protected invocation of runtime callables from native code
//!
//! A [`ProtectedFunction`] calls a runtime value so that neither runtime
//! errors nor panics raised by native callbacks escape the call:
//!
//! - runtime errors become a [`CallStatus`] plus an error value left on the
//!   stack, optionally transformed by the function's error handler;
//! - panics unwinding out of native functions the runtime invoked are caught
//!   at the call boundary and converted into a runtime error the same way.
//!
//! The error handler is placed on the stack for the duration of one call by
//! a [`HandlerScope`], which removes it again on every exit path.

mod function;
mod handler;
pub(crate) mod marshal;
mod result;

pub use function::ProtectedFunction;
pub use handler::HandlerScope;
pub use result::ProtectedFunctionResult;

use crate::stack::ConversionError;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// Outcome of a protected call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStatus {
    Ok,
    /// Raised by the callee or by a native function it invoked
    Runtime,
    Syntax,
    Memory,
    /// The error handler itself failed
    Handler,
    /// A status code this version does not know
    Unknown(i32),
}

impl CallStatus {
    /// Map a raw status code from [`State::pcall`](crate::State::pcall)
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => CallStatus::Ok,
            1 => CallStatus::Runtime,
            2 => CallStatus::Syntax,
            3 => CallStatus::Memory,
            4 => CallStatus::Handler,
            other => CallStatus::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            CallStatus::Ok => 0,
            CallStatus::Runtime => 1,
            CallStatus::Syntax => 2,
            CallStatus::Memory => 3,
            CallStatus::Handler => 4,
            CallStatus::Unknown(code) => code,
        }
    }

    pub fn is_ok(self) -> bool {
        self == CallStatus::Ok
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Ok => write!(f, "ok"),
            CallStatus::Runtime => write!(f, "runtime error"),
            CallStatus::Syntax => write!(f, "syntax error"),
            CallStatus::Memory => write!(f, "memory error"),
            CallStatus::Handler => write!(f, "error in error handler"),
            CallStatus::Unknown(code) => write!(f, "unknown status {}", code),
        }
    }
}

/// Failure of a typed protected call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The call did not complete; `message` is the error value's text
    #[error("{status}: {message}")]
    Failed { status: CallStatus, message: String },
    /// The call completed but its results had the wrong shape
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl CallError {
    pub fn status(&self) -> CallStatus {
        match self {
            CallError::Failed { status, .. } => *status,
            CallError::Conversion(_) => CallStatus::Ok,
        }
    }
}

/// Explicit list of requested return types, for [`ProtectedFunction::call_with`]
pub struct Types<T>(PhantomData<fn() -> T>);

impl<T> Types<T> {
    pub const fn new() -> Self {
        Types(PhantomData)
    }
}

impl<T> Default for Types<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Types<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Types<T> {}

impl<T> fmt::Debug for Types<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Types<{}>", std::any::type_name::<T>())
    }
}
