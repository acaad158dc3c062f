//! Shared test utilities for protected call tests
//!
//! Builders for the small set of native functions the tests call through the
//! protected boundary.

#![allow(dead_code)]

use tether_runtime::native::NativeFunctionBuilder;
use tether_runtime::{Function, Reference, RuntimeError, State, Value};

/// Returns its arguments unchanged
pub fn identity() -> Function {
    NativeFunctionBuilder::new("identity")
        .variadic()
        .with_implementation(|state| Ok(state.top()))
        .build()
        .unwrap()
}

/// Raises `message` as a runtime error
pub fn failing(message: &'static str) -> Function {
    Function::new("failing", move |_| Err(RuntimeError::message(message)))
}

/// Panics with a string literal payload
pub fn panicking(message: &'static str) -> Function {
    Function::new("panicking", move |_| std::panic::panic_any(message))
}

/// Error handler that prefixes the error message
pub fn prefixing_handler(prefix: &'static str) -> Function {
    NativeFunctionBuilder::new("prefix_handler")
        .with_arity(1)
        .with_implementation(move |state| {
            let message = state.get(1).cloned().unwrap_or_default();
            state.push_value(Value::string(format!("{}{}", prefix, message)));
            Ok(1)
        })
        .build()
        .unwrap()
}

/// Reference to a handler function owned by `state`
pub fn handler_ref(state: &State, handler: Function) -> Reference {
    Reference::new(state, Value::Function(handler))
}

/// Whether any slot of the current frame holds `function`
pub fn stack_contains(state: &State, function: &Function) -> bool {
    state
        .args()
        .iter()
        .any(|value| matches!(value, Value::Function(f) if f == function))
}
