//! Scoped placement of an error handler on the runtime stack

use crate::reference::Reference;
use crate::state::State;
use crate::value::Value;
use std::ops::{Deref, DerefMut};

/// Keeps an error handler at a fixed stack index for one call.
///
/// The protected-call primitive finds the handler by position, so the handler
/// is pushed when the scope opens and removed from that same position when
/// the scope is dropped, on every exit path including unwinding. Code running
/// inside the scope reaches the runtime through `Deref`/`DerefMut`.
///
/// Scopes nest: a scope opened on top of another (through a re-entrant call)
/// is dropped first.
pub struct HandlerScope<'s> {
    state: &'s mut State,
    /// 1-based frame-relative index of the handler, 0 when there is none
    index: usize,
}

impl<'s> HandlerScope<'s> {
    /// Push `handler` if it is bound to `state`; otherwise the scope does
    /// nothing.
    pub fn new(state: &'s mut State, handler: &Reference) -> Self {
        let index = if !handler.belongs_to(state) {
            tracing::warn!("error handler belongs to a different runtime, not placed");
            0
        } else if handler.valid() {
            handler.push(state);
            let index = state.top();
            tracing::trace!(index, "error handler placed");
            index
        } else {
            0
        };
        Self { state, index }
    }

    /// Whether a handler occupies a stack slot
    pub fn valid(&self) -> bool {
        self.index > 0
    }

    /// Stack index of the handler, 0 when there is none
    pub fn index(&self) -> usize {
        self.index
    }

    /// Remove the handler now and disarm the scope.
    ///
    /// Returns the handler value so it can still be invoked directly.
    pub fn dismiss(&mut self) -> Option<Value> {
        if !self.valid() {
            return None;
        }
        let index = std::mem::take(&mut self.index);
        tracing::trace!(index, "error handler dismissed");
        self.state.remove(index)
    }
}

impl Deref for HandlerScope<'_> {
    type Target = State;

    fn deref(&self) -> &State {
        &*self.state
    }
}

impl DerefMut for HandlerScope<'_> {
    fn deref_mut(&mut self) -> &mut State {
        &mut *self.state
    }
}

impl Drop for HandlerScope<'_> {
    fn drop(&mut self) {
        if self.valid() {
            self.state.remove(self.index);
            tracing::trace!(index = self.index, "error handler removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unbound_handler_is_noop() {
        let mut state = State::new();
        state.push_value(Value::Number(1.0));
        {
            let scope = HandlerScope::new(&mut state, &Reference::empty());
            assert!(!scope.valid());
            assert_eq!(scope.index(), 0);
            assert_eq!(scope.top(), 1);
        }
        assert_eq!(state.top(), 1);
    }

    #[test]
    fn test_handler_removed_from_its_slot() {
        let mut state = State::new();
        let handler = Reference::new(&state, Value::string("handler"));
        state.push_value(Value::Number(1.0));
        {
            let mut scope = HandlerScope::new(&mut state, &handler);
            assert_eq!(scope.index(), 2);
            scope.push_value(Value::Number(2.0));
            scope.push_value(Value::Number(3.0));
        }
        // The handler was below the values pushed inside the scope.
        assert_eq!(
            state.args(),
            &[Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]
        );
    }

    #[test]
    fn test_nested_scopes_unwind_in_order() {
        let mut state = State::new();
        let outer_handler = Reference::new(&state, Value::string("outer"));
        let inner_handler = Reference::new(&state, Value::string("inner"));

        let mut outer = HandlerScope::new(&mut state, &outer_handler);
        assert_eq!(outer.index(), 1);
        {
            let inner = HandlerScope::new(&mut outer, &inner_handler);
            assert_eq!(inner.index(), 2);
            assert_eq!(inner.get(1), Some(&Value::string("outer")));
        }
        assert_eq!(outer.top(), 1);
        drop(outer);
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn test_foreign_handler_is_not_placed() {
        let other = State::new();
        let foreign = Reference::new(&other, Value::string("foreign"));
        let mut state = State::new();
        {
            let scope = HandlerScope::new(&mut state, &foreign);
            assert!(!scope.valid());
            assert_eq!(scope.top(), 0);
        }
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn test_dismiss_disarms() {
        let mut state = State::new();
        let handler = Reference::new(&state, Value::Bool(true));
        {
            let mut scope = HandlerScope::new(&mut state, &handler);
            scope.push_value(Value::Number(9.0));
            assert_eq!(scope.dismiss(), Some(Value::Bool(true)));
            assert!(!scope.valid());
            assert_eq!(scope.dismiss(), None);
        }
        assert_eq!(state.args(), &[Value::Number(9.0)]);
    }
}
