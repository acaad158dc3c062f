//! Tether runtime bridge
//!
//! Calls values owned by an embedded stack runtime from native Rust code
//! without letting errors escape the call boundary:
//!
//! - [`State`] - the runtime instance: value stack, native call frames,
//!   globals and the raw protected-call primitive
//! - [`stack`] - marshaling between Rust values and stack slots
//! - [`ProtectedFunction`] - a callable plus its error handler, invoked either
//!   for a deferred [`ProtectedFunctionResult`] or for typed returns
//! - [`native`] - building runtime functions from Rust closures
//!
//! # Examples
//!
//! ```
//! use tether_runtime::{CallStatus, Function, ProtectedFunction, RuntimeError, State, Value};
//!
//! let mut state = State::new();
//! state.set_global(
//!     "fail",
//!     Value::Function(Function::new("fail", |_| Err(RuntimeError::message("no luck")))),
//! );
//!
//! let callable = ProtectedFunction::from_global(&state, "fail").unwrap();
//! let result = callable.call(&mut state, ());
//! assert_eq!(result.status(), CallStatus::Runtime);
//! assert_eq!(result.error_message().as_deref(), Some("no luck"));
//! result.discard();
//! assert_eq!(state.top(), 0);
//! ```

pub mod native;
pub mod protected;
pub mod reference;
pub mod stack;
pub mod state;
pub mod value;

pub use protected::{
    CallError, CallStatus, HandlerScope, ProtectedFunction, ProtectedFunctionResult, Types,
};
pub use reference::Reference;
pub use stack::{ConversionError, FromValue, Push, Returns, Variadic};
pub use state::{State, StateId, MULTRET};
pub use tether_config::RuntimeConfig;
pub use value::{Function, NativeFn, RuntimeError, Value};
