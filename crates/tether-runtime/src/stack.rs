//! Marshaling between Rust values and the runtime stack
//!
//! - [`Push`] - push a Rust value, reporting how many slots it produced
//!   (tuples and [`Variadic`] expand to several slots)
//! - [`FromValue`] - convert a single stack slot to a Rust value
//! - [`Returns`] - pop a fixed number of slots into a Rust shape
//!   (`()`, a single value or a tuple)
//!
//! # Examples
//!
//! ```
//! use tether_runtime::stack::{multi_push, pop};
//! use tether_runtime::State;
//!
//! let mut state = State::new();
//! let pushed = multi_push(&mut state, (1.5, "two", true));
//! assert_eq!(pushed, 3);
//!
//! let (a, b, c): (f64, String, bool) = pop(&mut state).unwrap();
//! assert_eq!((a, b.as_str(), c), (1.5, "two", true));
//! assert_eq!(state.top(), 0);
//! ```

use crate::reference::Reference;
use crate::state::State;
use crate::value::{Function, Value};
use std::sync::Arc;
use thiserror::Error;

/// Error type for value conversion failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// Type mismatch during conversion
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    /// No value at the requested stack index
    #[error("No value at stack index {index}")]
    MissingValue { index: usize },
    /// Fewer values on the stack than the requested shape needs
    #[error("Expected {expected} values on the stack, found {found}")]
    NotEnoughValues { expected: usize, found: usize },
}

fn mismatch(expected: &str, value: &Value) -> ConversionError {
    ConversionError::TypeMismatch {
        expected: expected.to_string(),
        found: value.type_name().to_string(),
    }
}

// ============================================================================
// Push
// ============================================================================

/// Push a Rust value onto the stack
pub trait Push {
    /// Push the value and return the number of stack slots produced
    fn push(self, state: &mut State) -> usize;
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

macro_rules! impl_push_single {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Push for $ty {
                fn push(self, state: &mut State) -> usize {
                    state.push_value(Value::from(self));
                    1
                }
            }
        )+
    };
}

impl_push_single!(bool, f64, i64, i32, String, Function);

impl Push for Value {
    fn push(self, state: &mut State) -> usize {
        state.push_value(self);
        1
    }
}

impl Push for &Value {
    fn push(self, state: &mut State) -> usize {
        state.push_value(self.clone());
        1
    }
}

impl Push for &str {
    fn push(self, state: &mut State) -> usize {
        state.push_value(Value::from(self));
        1
    }
}

impl Push for &Reference {
    fn push(self, state: &mut State) -> usize {
        Reference::push(self, state)
    }
}

impl Push for Reference {
    fn push(self, state: &mut State) -> usize {
        Reference::push(&self, state)
    }
}

impl<T: Push> Push for Option<T> {
    fn push(self, state: &mut State) -> usize {
        match self {
            Some(value) => value.push(state),
            None => {
                state.push_value(Value::Nil);
                1
            }
        }
    }
}

/// No arguments
impl Push for () {
    fn push(self, _state: &mut State) -> usize {
        0
    }
}

/// A run of values pushed as separate slots
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variadic<T>(pub Vec<T>);

impl<T: Push> Push for Variadic<T> {
    fn push(self, state: &mut State) -> usize {
        self.0.into_iter().map(|value| value.push(state)).sum()
    }
}

macro_rules! impl_push_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Push),+> Push for ($($name,)+) {
            fn push(self, state: &mut State) -> usize {
                0 $(+ self.$idx.push(state))+
            }
        }
    };
}

impl_push_tuple!(A: 0);
impl_push_tuple!(A: 0, B: 1);
impl_push_tuple!(A: 0, B: 1, C: 2);
impl_push_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_push_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_push_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_push_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_push_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

/// Push every argument, returning the total slot count
pub fn multi_push<A: Push>(state: &mut State, args: A) -> usize {
    args.push(state)
}

// ============================================================================
// FromValue
// ============================================================================

/// Convert a single stack value to a Rust type
pub trait FromValue: Sized {
    /// # Errors
    ///
    /// Returns `ConversionError` if the value cannot be converted to the target type.
    fn from_value(value: &Value) -> Result<Self, ConversionError>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(*b),
            _ => Err(mismatch("boolean", value)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Number(n) => Ok(*n),
            _ => Err(mismatch("number", value)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Number(n)
                if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64 =>
            {
                Ok(*n as i64)
            }
            _ => Err(mismatch("integer", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| mismatch("32-bit integer", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::String(s) => Ok(s.to_string()),
            _ => Err(mismatch("string", value)),
        }
    }
}

impl FromValue for Function {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Function(f) => Ok(f.clone()),
            _ => Err(mismatch("function", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Nil => Ok(None),
            _ => Ok(Some(T::from_value(value)?)),
        }
    }
}

/// Convert the value at a stack index without removing it
pub fn get<T: FromValue>(state: &State, index: usize) -> Result<T, ConversionError> {
    state
        .get(index)
        .ok_or(ConversionError::MissingValue { index })
        .and_then(T::from_value)
}

// ============================================================================
// Returns
// ============================================================================

/// A fixed-arity shape popped off the top of the stack
pub trait Returns: Sized {
    /// Number of stack slots consumed
    const COUNT: usize;

    /// Convert and remove the top `COUNT` values.
    ///
    /// The values are removed even when a conversion fails, so the stack
    /// stays balanced.
    fn pop_returns(state: &mut State) -> Result<Self, ConversionError>;
}

impl Returns for () {
    const COUNT: usize = 0;

    fn pop_returns(_state: &mut State) -> Result<Self, ConversionError> {
        Ok(())
    }
}

fn pop_single<T: FromValue>(state: &mut State) -> Result<T, ConversionError> {
    let top = state.top();
    if top == 0 {
        return Err(ConversionError::NotEnoughValues {
            expected: 1,
            found: 0,
        });
    }
    let converted = get::<T>(state, top);
    state.set_top(top - 1);
    converted
}

macro_rules! impl_returns_single {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Returns for $ty {
                const COUNT: usize = 1;

                fn pop_returns(state: &mut State) -> Result<Self, ConversionError> {
                    pop_single(state)
                }
            }
        )+
    };
}

impl_returns_single!(Value, bool, f64, i64, i32, String, Function);

impl<T: FromValue> Returns for Option<T> {
    const COUNT: usize = 1;

    fn pop_returns(state: &mut State) -> Result<Self, ConversionError> {
        pop_single(state)
    }
}

macro_rules! impl_returns_tuple {
    ($count:expr; $($name:ident : $idx:tt),+) => {
        impl<$($name: FromValue),+> Returns for ($($name,)+) {
            const COUNT: usize = $count;

            fn pop_returns(state: &mut State) -> Result<Self, ConversionError> {
                let top = state.top();
                if top < $count {
                    return Err(ConversionError::NotEnoughValues {
                        expected: $count,
                        found: top,
                    });
                }
                let first = top - $count + 1;
                let converted: Result<Self, ConversionError> =
                    (|| Ok(($(get::<$name>(state, first + $idx)?,)+)))();
                state.set_top(top - $count);
                converted
            }
        }
    };
}

impl_returns_tuple!(1; A: 0);
impl_returns_tuple!(2; A: 0, B: 1);
impl_returns_tuple!(3; A: 0, B: 1, C: 2);
impl_returns_tuple!(4; A: 0, B: 1, C: 2, D: 3);
impl_returns_tuple!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
impl_returns_tuple!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_returns_tuple!(7; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_returns_tuple!(8; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

/// Pop a fixed-arity shape off the top of the stack
pub fn pop<R: Returns>(state: &mut State) -> Result<R, ConversionError> {
    R::pop_returns(state)
}
