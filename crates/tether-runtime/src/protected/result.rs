//! Deferred view over the values a protected call left on the stack

use super::CallStatus;
use crate::stack::{ConversionError, FromValue};
use crate::state::State;
use crate::value::Value;

/// Outcome of a [`ProtectedFunction::call`](super::ProtectedFunction::call).
///
/// Describes a contiguous run of values at the top of the stack: the results
/// on success, or the single error value on failure. Nothing is converted
/// until asked for, and dropping the result does not touch the stack; use
/// [`into_values`](Self::into_values) or [`discard`](Self::discard) to
/// consume the values.
///
/// The result borrows the runtime mutably, so no other stack operation can
/// happen while the described range is being read.
#[derive(Debug)]
pub struct ProtectedFunctionResult<'s> {
    state: &'s mut State,
    index: usize,
    return_count: usize,
    pop_count: usize,
    status: CallStatus,
}

impl<'s> ProtectedFunctionResult<'s> {
    /// Describe the topmost `count` values
    pub(crate) fn new(state: &'s mut State, count: usize, status: CallStatus) -> Self {
        let index = state.top() + 1 - count;
        Self {
            state,
            index,
            return_count: count,
            pop_count: count,
            status,
        }
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    /// Whether the call succeeded
    pub fn valid(&self) -> bool {
        self.status.is_ok()
    }

    /// Number of values the call produced (1 on failure: the error value)
    pub fn return_count(&self) -> usize {
        self.return_count
    }

    /// Number of stack slots consumed by `into_values`/`discard`
    pub fn pop_count(&self) -> usize {
        self.pop_count
    }

    /// Stack index of the first described value
    pub fn stack_index(&self) -> usize {
        self.index
    }

    /// Value at `offset` (0-based) within the described range
    pub fn value(&self, offset: usize) -> Option<&Value> {
        self.values().get(offset)
    }

    /// All described values, first result first
    pub fn values(&self) -> &[Value] {
        self.state.slice(self.index, self.return_count)
    }

    /// Convert the value at `offset` (0-based) within the described range
    pub fn get<T: FromValue>(&self, offset: usize) -> Result<T, ConversionError> {
        if offset >= self.return_count {
            return Err(ConversionError::MissingValue {
                index: self.index + offset,
            });
        }
        let value = self.value(offset).ok_or(ConversionError::MissingValue {
            index: self.index + offset,
        })?;
        T::from_value(value)
    }

    /// The error value, when the call failed
    pub fn error(&self) -> Option<&Value> {
        if self.valid() {
            None
        } else {
            self.value(0)
        }
    }

    /// Text of the error value, when the call failed
    pub fn error_message(&self) -> Option<String> {
        self.error().map(Value::to_string)
    }

    /// Remove the described values from the stack and return them
    pub fn into_values(self) -> Vec<Value> {
        self.state.drain(self.index, self.pop_count)
    }

    /// Remove the described values from the stack
    pub fn discard(self) {
        self.state.drain(self.index, self.pop_count);
    }
}
