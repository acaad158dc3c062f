//! Runtime callables invoked through the protected-call boundary

use super::handler::HandlerScope;
use super::marshal;
use super::result::ProtectedFunctionResult;
use super::{CallError, CallStatus, Types};
use crate::reference::Reference;
use crate::stack::{Push, Returns};
use crate::state::State;
use crate::value::{Function, RuntimeError, Value};

/// A runtime callable plus the error handler used when calling it.
///
/// The handler starts as a copy of the runtime's default handler at
/// construction time and can be changed per instance without affecting other
/// instances or the default.
///
/// # Examples
///
/// ```
/// use tether_runtime::{Function, ProtectedFunction, State, Value};
///
/// let mut state = State::new();
/// let identity = Function::new("identity", |state| Ok(state.top()));
/// let callable = ProtectedFunction::from_function(&state, identity);
///
/// let result = callable.call(&mut state, (1.0, "two"));
/// assert!(result.valid());
/// assert_eq!(result.return_count(), 2);
/// assert_eq!(result.get::<String>(1).unwrap(), "two");
/// result.discard();
///
/// let sum: f64 = callable.call_as(&mut state, 3.0).unwrap();
/// assert_eq!(sum, 3.0);
/// assert_eq!(state.top(), 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtectedFunction {
    reference: Reference,
    error_handler: Reference,
}

impl ProtectedFunction {
    /// Wrap the value at a stack index.
    ///
    /// With `check_arguments` enabled in the runtime's configuration, a value
    /// that is not a function is rejected with a type error.
    pub fn from_stack(state: &State, index: usize) -> Result<Self, RuntimeError> {
        let value = state.get(index).cloned().unwrap_or_default();
        Self::from_value(state, value)
    }

    /// Wrap a global by name
    pub fn from_global(state: &State, name: &str) -> Result<Self, RuntimeError> {
        let value = state.global(name).cloned().unwrap_or_default();
        Self::from_value(state, value)
    }

    /// Wrap an existing reference
    pub fn from_reference(state: &State, reference: Reference) -> Result<Self, RuntimeError> {
        if !reference.belongs_to(state) {
            return Err(RuntimeError::type_error(
                "reference belongs to a different runtime",
            ));
        }
        let value = reference.value().cloned().unwrap_or_default();
        Self::from_value(state, value)
    }

    pub fn from_function(state: &State, function: Function) -> Self {
        Self {
            reference: Reference::new(state, Value::Function(function)),
            error_handler: state.default_handler().clone(),
        }
    }

    fn from_value(state: &State, value: Value) -> Result<Self, RuntimeError> {
        if state.config().check_arguments && !value.is_function() {
            return Err(RuntimeError::type_error(format!(
                "expected function, got {}",
                value.type_name()
            )));
        }
        Ok(Self {
            reference: Reference::new(state, value),
            error_handler: state.default_handler().clone(),
        })
    }

    /// The wrapped callable
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn error_handler(&self) -> &Reference {
        &self.error_handler
    }

    pub fn set_error_handler(&mut self, handler: Reference) {
        self.error_handler = handler;
    }

    pub fn clear_error_handler(&mut self) {
        self.error_handler = Reference::empty();
    }

    /// Call and leave every result on the stack, described by the returned
    /// [`ProtectedFunctionResult`].
    ///
    /// Never panics because of the callee: runtime errors and panics from
    /// native callbacks both come back as a non-ok status with one error
    /// value.
    ///
    /// A caught panic still runs the process panic hook first, and the
    /// default hook prints a "thread ... panicked at" line to stderr. Embedders
    /// that want panics converted silently install their own hook with
    /// [`std::panic::set_hook`].
    pub fn call<'s, A: Push>(&self, state: &'s mut State, args: A) -> ProtectedFunctionResult<'s> {
        if let Some(message) = self.foreign_owner(state) {
            state.push_value(Value::string(message));
            return ProtectedFunctionResult::new(state, 1, CallStatus::Runtime);
        }

        let (count, status) = {
            let mut scope = HandlerScope::new(state, &self.error_handler);
            let nargs = self.push_call(&mut scope, args);
            marshal::invoke_deferred(&mut scope, nargs)
        };
        ProtectedFunctionResult::new(state, count, status)
    }

    /// Call and convert exactly `R::COUNT` results: `()`, a single value or a
    /// tuple.
    ///
    /// The status is checked: a failed call pops its error value and returns
    /// [`CallError::Failed`]. Either way the stack is left as it was before
    /// the call.
    pub fn call_as<R: Returns, A: Push>(&self, state: &mut State, args: A) -> Result<R, CallError> {
        if let Some(message) = self.foreign_owner(state) {
            return Err(CallError::Failed {
                status: CallStatus::Runtime,
                message: message.to_string(),
            });
        }

        let mut scope = HandlerScope::new(state, &self.error_handler);
        let nargs = self.push_call(&mut scope, args);
        marshal::invoke_typed::<R>(&mut scope, nargs)
    }

    /// [`call_as`](Self::call_as) with the return types given as a value
    pub fn call_with<R: Returns, A: Push>(
        &self,
        state: &mut State,
        _types: Types<R>,
        args: A,
    ) -> Result<R, CallError> {
        self.call_as::<R, A>(state, args)
    }

    /// Push the callable and its arguments; returns the argument slot count
    fn push_call<A: Push>(&self, state: &mut State, args: A) -> usize {
        Reference::push(&self.reference, state);
        args.push(state)
    }

    fn foreign_owner(&self, state: &State) -> Option<&'static str> {
        if !self.reference.belongs_to(state) {
            Some("attempt to call a function owned by a different runtime")
        } else if !self.error_handler.belongs_to(state) {
            Some("error handler belongs to a different runtime")
        } else {
            None
        }
    }
}
