//! Native function registration and builder
//!
//! This module provides infrastructure for turning Rust closures into callable
//! runtime functions. Native functions can be built with fixed arity (specific
//! argument count) or variadic (any argument count).
//!
//! A native function receives the runtime with its arguments at stack indices
//! `1..=state.top()`, pushes its results, and returns how many it pushed.
//!
//! # Examples
//!
//! ```rust
//! use tether_runtime::native::NativeFunctionBuilder;
//! use tether_runtime::stack::get;
//! use tether_runtime::Value;
//!
//! // Fixed arity function (2 arguments)
//! let add_fn = NativeFunctionBuilder::new("add")
//!     .with_arity(2)
//!     .with_implementation(|state| {
//!         let a: f64 = get(state, 1).map_err(|e| tether_runtime::RuntimeError::type_error(e.to_string()))?;
//!         let b: f64 = get(state, 2).map_err(|e| tether_runtime::RuntimeError::type_error(e.to_string()))?;
//!         state.push_value(Value::Number(a + b));
//!         Ok(1)
//!     })
//!     .build()
//!     .unwrap();
//!
//! // Variadic function (any number of arguments): returns them unchanged
//! let identity_fn = NativeFunctionBuilder::new("identity")
//!     .variadic()
//!     .with_implementation(|state| Ok(state.top()))
//!     .build()
//!     .unwrap();
//! # let _ = (add_fn, identity_fn);
//! ```

use crate::state::State;
use crate::value::{Function, RuntimeError};

/// Type alias for native function implementation
type NativeFnImpl = Box<dyn Fn(&mut State) -> Result<usize, RuntimeError> + Send + Sync>;

/// Builder for constructing native functions with arity validation
///
/// Supports both fixed-arity functions (must be called with exact argument count) and
/// variadic functions (can be called with any number of arguments).
pub struct NativeFunctionBuilder {
    name: String,
    arity: Option<usize>,
    implementation: Option<NativeFnImpl>,
}

impl NativeFunctionBuilder {
    /// Create a new native function builder with the given name
    ///
    /// The name is used in error messages and in the function's display form.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arity: None,
            implementation: None,
        }
    }

    /// Set the function's arity (required argument count)
    ///
    /// Calls with too few or too many arguments raise a runtime type error
    /// before the implementation runs.
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    /// Mark this function as variadic (accepts any number of arguments)
    pub fn variadic(mut self) -> Self {
        self.arity = None;
        self
    }

    /// Set the function implementation
    pub fn with_implementation<F>(mut self, implementation: F) -> Self
    where
        F: Fn(&mut State) -> Result<usize, RuntimeError> + Send + Sync + 'static,
    {
        self.implementation = Some(Box::new(implementation));
        self
    }

    /// Build the function value
    ///
    /// # Returns
    ///
    /// * `Ok(Function)` - Function ready to push or store as a global
    /// * `Err(BuildError)` - If implementation was not provided
    pub fn build(self) -> Result<Function, BuildError> {
        let implementation = self
            .implementation
            .ok_or_else(|| BuildError::MissingImplementation(self.name.clone()))?;

        let name = self.name.clone();

        let function = match self.arity {
            Some(expected_arity) => Function::new(self.name, move |state: &mut State| {
                let got = state.top();
                if got != expected_arity {
                    return Err(RuntimeError::type_error(format!(
                        "Function '{}' expects {} argument{}, got {}",
                        name,
                        expected_arity,
                        if expected_arity == 1 { "" } else { "s" },
                        got
                    )));
                }
                implementation(state)
            }),
            None => Function::new(self.name, move |state: &mut State| implementation(state)),
        };

        Ok(function)
    }
}

/// Errors that can occur when building a native function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// No implementation was provided
    MissingImplementation(String),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::MissingImplementation(name) => {
                write!(f, "Native function '{}' missing implementation", name)
            }
        }
    }
}

impl std::error::Error for BuildError {}
