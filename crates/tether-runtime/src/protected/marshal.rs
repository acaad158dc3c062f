//! Performs the protected call and shapes its results
//!
//! This is the single place where panics from native callbacks are turned
//! into runtime errors. Everything above it sees only a status and stack
//! values.

use super::handler::HandlerScope;
use super::{CallError, CallStatus};
use crate::stack::Returns;
use crate::state::{State, MULTRET};
use crate::value::{RuntimeError, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Message used when a panic payload carries no readable message
pub(crate) const UNKNOWN_ERROR: &str = "caught unknown error during protected call";

/// Call with every result left on the stack.
///
/// The callable sits `nargs` slots below the top. Returns the status and the
/// number of values now occupying the callable's former position onwards.
pub(crate) fn invoke_deferred(scope: &mut HandlerScope<'_>, nargs: usize) -> (usize, CallStatus) {
    let callable = scope.top() - nargs;
    let status = guarded_pcall(scope, nargs, MULTRET);
    // Failures always leave exactly one error value, which may sit one slot
    // lower if the handler slot below the callable was dismissed.
    let count = if status.is_ok() {
        scope.top() + 1 - callable
    } else {
        1
    };
    (count, status)
}

/// Call requesting exactly `R::COUNT` results and convert them.
///
/// A non-ok status pops the error value and reports it as
/// [`CallError::Failed`].
pub(crate) fn invoke_typed<R: Returns>(
    scope: &mut HandlerScope<'_>,
    nargs: usize,
) -> Result<R, CallError> {
    let status = guarded_pcall(scope, nargs, R::COUNT);
    if status.is_ok() {
        return Ok(R::pop_returns(scope)?);
    }
    let payload = scope.pop_value().unwrap_or_default();
    Err(CallError::Failed {
        status,
        message: payload.to_string(),
    })
}

/// Run the raw protected call inside a panic boundary.
///
/// On a panic the stack is cut back to just below the callable, the handler
/// slot is dismissed so the scope does not remove it a second time, and one
/// error value is pushed in place of the results.
fn guarded_pcall(scope: &mut HandlerScope<'_>, nargs: usize, nresults: usize) -> CallStatus {
    let callable = scope.top() - nargs;
    let handler_index = scope.index();

    let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
        scope.pcall(nargs, nresults, handler_index)
    }));

    match attempt {
        Ok(code) => {
            let status = CallStatus::from_code(code);
            tracing::debug!(%status, nargs, "protected call returned");
            status
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(%message, "native panic caught at protected call boundary");
            scope.set_top(callable - 1);
            let handler = scope.dismiss();
            report_native_error(scope, handler, message)
        }
    }
}

/// Push the error value for a caught panic and return the resulting status.
fn report_native_error(state: &mut State, handler: Option<Value>, message: String) -> CallStatus {
    let Some(handler) = handler else {
        state.push_value(Value::string(message));
        return CallStatus::Runtime;
    };

    let base = state.top();
    state.push_value(handler);
    state.push_value(Value::string(message));

    let handled = panic::catch_unwind(AssertUnwindSafe(|| state.call(1, 1)));
    let failure = match handled {
        Ok(Ok(())) => return CallStatus::Runtime,
        Ok(Err(err)) => err.into_value(),
        Err(payload) => Value::string(panic_message(payload.as_ref())),
    };

    tracing::warn!(error = %failure, "error handler failed");
    state.set_top(base);
    state.push_value(failure);
    CallStatus::Handler
}

/// Text of a panic payload.
///
/// Plain messages (`&str`, `String`) and structured errors are read the same
/// way; anything else becomes [`UNKNOWN_ERROR`].
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(err) = payload.downcast_ref::<Box<dyn std::error::Error + Send + Sync>>() {
        err.to_string()
    } else if let Some(err) = payload.downcast_ref::<RuntimeError>() {
        err.to_string()
    } else {
        UNKNOWN_ERROR.to_string()
    }
}
