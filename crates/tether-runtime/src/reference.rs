//! Handles to runtime values held from native code

use crate::state::{State, StateId};
use crate::value::Value;

/// A bound or empty handle to a value owned by one runtime instance.
///
/// Nil is never bound: referencing nil yields an empty reference, and an
/// empty reference pushes nil.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reference {
    bound: Option<Bound>,
}

#[derive(Clone, Debug, PartialEq)]
struct Bound {
    owner: StateId,
    value: Value,
}

impl Reference {
    pub fn empty() -> Self {
        Self { bound: None }
    }

    pub fn new(state: &State, value: Value) -> Self {
        if value.is_nil() {
            return Self::empty();
        }
        Self {
            bound: Some(Bound {
                owner: state.id(),
                value,
            }),
        }
    }

    /// Reference the value at a stack index (empty if the index is invalid)
    pub fn from_stack(state: &State, index: usize) -> Self {
        match state.get(index) {
            Some(value) => Self::new(state, value.clone()),
            None => Self::empty(),
        }
    }

    pub fn valid(&self) -> bool {
        self.bound.is_some()
    }

    /// The runtime instance this reference is bound to
    pub fn owner(&self) -> Option<StateId> {
        self.bound.as_ref().map(|bound| bound.owner)
    }

    pub fn value(&self) -> Option<&Value> {
        self.bound.as_ref().map(|bound| &bound.value)
    }

    /// Whether the reference may be pushed onto `state`
    pub fn belongs_to(&self, state: &State) -> bool {
        self.owner().map_or(true, |owner| owner == state.id())
    }

    /// Push the referenced value (nil when empty); returns the slot count.
    pub fn push(&self, state: &mut State) -> usize {
        debug_assert!(self.belongs_to(state), "reference pushed onto a foreign runtime");
        state.push_value(self.value().cloned().unwrap_or_default());
        1
    }
}
