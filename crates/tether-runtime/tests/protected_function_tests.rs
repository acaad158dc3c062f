//! Protected call tests
//!
//! Calls runtime functions through `ProtectedFunction` and checks statuses,
//! results, error handler behavior and stack balance on success, runtime
//! error and native panic paths.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tether_runtime::native::NativeFunctionBuilder;
use tether_runtime::{
    CallError, CallStatus, ConversionError, Function, ProtectedFunction, Reference, RuntimeConfig,
    RuntimeError, State, Types, Value, Variadic,
};

fn protected(state: &State, function: Function) -> ProtectedFunction {
    ProtectedFunction::from_function(state, function)
}

// ============================================================================
// Deferred results
// ============================================================================

#[rstest]
#[case::no_args(vec![])]
#[case::one_arg(vec![1.0])]
#[case::several_args(vec![1.0, -2.5, 3.0, 40.0])]
fn test_identity_returns_arguments_in_order(#[case] args: Vec<f64>) {
    let mut state = State::new();
    let callable = protected(&state, identity());

    let result = callable.call(&mut state, Variadic(args.clone()));

    assert_eq!(result.status(), CallStatus::Ok);
    assert!(result.valid());
    assert_eq!(result.return_count(), args.len());
    for (offset, expected) in args.iter().enumerate() {
        assert_eq!(result.get::<f64>(offset).unwrap(), *expected);
    }
    assert_eq!(result.error(), None);

    let values = result.into_values();
    assert_eq!(values.len(), args.len());
    assert_eq!(state.top(), 0);
}

#[test]
fn test_results_sit_above_existing_values() {
    let mut state = State::new();
    state.push_value(Value::string("below"));
    let mut callable = protected(&state, identity());
    callable.set_error_handler(handler_ref(&state, prefixing_handler("x")));

    let result = callable.call(&mut state, (1.0, 2.0));

    assert_eq!(result.stack_index(), 2);
    assert_eq!(result.values(), &[Value::Number(1.0), Value::Number(2.0)]);
    result.discard();
    assert_eq!(state.args(), &[Value::string("below")]);
}

#[test]
fn test_get_out_of_range() {
    let mut state = State::new();
    let callable = protected(&state, identity());

    let result = callable.call(&mut state, 1.0);

    assert!(matches!(
        result.get::<f64>(1),
        Err(ConversionError::MissingValue { .. })
    ));
    assert!(matches!(
        result.get::<bool>(0),
        Err(ConversionError::TypeMismatch { .. })
    ));
}

// ============================================================================
// Runtime errors
// ============================================================================

#[test]
fn test_runtime_error_without_handler() {
    let mut state = State::new();
    let callable = protected(&state, failing("bad input"));

    let result = callable.call(&mut state, 1.0);

    assert_eq!(result.status(), CallStatus::Runtime);
    assert_eq!(result.return_count(), 1);
    assert_eq!(result.error_message().as_deref(), Some("bad input"));
    result.discard();
    assert_eq!(state.top(), 0);
}

#[test]
fn test_runtime_error_with_handler() {
    let mut state = State::new();
    let handler = prefixing_handler("handled: ");
    let mut callable = protected(&state, failing("bad input"));
    callable.set_error_handler(handler_ref(&state, handler.clone()));

    let result = callable.call(&mut state, ());

    assert_eq!(result.status(), CallStatus::Runtime);
    assert_eq!(result.return_count(), 1);
    assert_eq!(result.get::<String>(0).unwrap(), "handled: bad input");
    result.discard();
    assert_eq!(state.top(), 0);
    assert!(!stack_contains(&state, &handler));
}

#[rstest]
#[case::syntax(RuntimeError::Syntax("unexpected symbol".into()), CallStatus::Syntax)]
#[case::memory(RuntimeError::Memory("not enough memory".into()), CallStatus::Memory)]
#[case::type_error(RuntimeError::type_error("bad argument"), CallStatus::Runtime)]
fn test_error_kinds_map_to_status(#[case] error: RuntimeError, #[case] expected: CallStatus) {
    let mut state = State::new();
    let message = error.to_string();
    let callable = protected(&state, Function::new("raise", move |_| Err(error.clone())));

    let result = callable.call(&mut state, ());

    assert_eq!(result.status(), expected);
    assert_eq!(result.error_message(), Some(message));
}

#[test]
fn test_failing_handler_reports_handler_status() {
    let mut state = State::new();
    let mut callable = protected(&state, failing("first"));
    callable.set_error_handler(handler_ref(&state, failing("handler broke")));

    let result = callable.call(&mut state, ());

    assert_eq!(result.status(), CallStatus::Handler);
    assert_eq!(result.error_message().as_deref(), Some("handler broke"));
    result.discard();
    assert_eq!(state.top(), 0);
}

#[test]
fn test_calling_non_function() {
    let mut state = State::new();
    state.push_value(Value::Number(3.0));
    let callable = ProtectedFunction::from_stack(&state, 1).unwrap();
    state.set_top(0);

    let result = callable.call(&mut state, ());
    assert_eq!(result.status(), CallStatus::Runtime);
    assert_eq!(
        result.error_message().as_deref(),
        Some("attempt to call a number value")
    );
}

#[test]
fn test_default_protected_function_calls_nil() {
    let mut state = State::new();
    let callable = ProtectedFunction::default();

    let result = callable.call(&mut state, ());
    assert_eq!(
        result.error_message().as_deref(),
        Some("attempt to call a nil value")
    );
}

// ============================================================================
// Native panics
// ============================================================================

#[test]
fn test_panic_without_handler() {
    let mut state = State::new();
    state.push_value(Value::Bool(true));
    let callable = protected(&state, panicking("boom"));

    let result = callable.call(&mut state, (1.0, 2.0));

    assert_eq!(result.status(), CallStatus::Runtime);
    assert_eq!(result.return_count(), 1);
    assert_eq!(result.get::<String>(0).unwrap(), "boom");
    result.discard();
    assert_eq!(state.args(), &[Value::Bool(true)]);
    assert_eq!(state.frame_depth(), 0);
}

#[test]
fn test_panic_with_handler() {
    let mut state = State::new();
    let handler = prefixing_handler("caught: ");
    let mut callable = protected(&state, panicking("boom"));
    callable.set_error_handler(handler_ref(&state, handler.clone()));

    let result = callable.call(&mut state, "ignored");

    assert_eq!(result.status(), CallStatus::Runtime);
    assert_eq!(result.return_count(), 1);
    assert_eq!(result.stack_index(), 1);
    assert_eq!(result.get::<String>(0).unwrap(), "caught: boom");
    result.discard();
    assert_eq!(state.top(), 0);
    assert!(!stack_contains(&state, &handler));
}

#[test]
fn test_panic_payload_shapes() {
    let mut state = State::new();

    let formatted = Function::new("formatted", |_| panic!("code {}", 7));
    let result = protected(&state, formatted).call(&mut state, ());
    assert_eq!(result.error_message().as_deref(), Some("code 7"));
    result.discard();

    let structured = Function::new("structured", |_| {
        let err: Box<dyn std::error::Error + Send + Sync> = "disk full".into();
        std::panic::panic_any(err)
    });
    let result = protected(&state, structured).call(&mut state, ());
    assert_eq!(result.error_message().as_deref(), Some("disk full"));
    result.discard();

    let opaque = Function::new("opaque", |_| std::panic::panic_any(17_i32));
    let result = protected(&state, opaque).call(&mut state, ());
    assert_eq!(result.status(), CallStatus::Runtime);
    assert_eq!(
        result.error_message().as_deref(),
        Some("caught unknown error during protected call")
    );
    result.discard();

    assert_eq!(state.top(), 0);
}

#[test]
fn test_panicking_handler_after_panic() {
    let mut state = State::new();
    let mut callable = protected(&state, panicking("boom"));
    callable.set_error_handler(handler_ref(&state, panicking("handler boom")));

    let result = callable.call(&mut state, ());

    assert_eq!(result.status(), CallStatus::Handler);
    assert_eq!(result.error_message().as_deref(), Some("handler boom"));
    result.discard();
    assert_eq!(state.top(), 0);
}

#[test]
fn test_panicking_handler_after_runtime_error() {
    let mut state = State::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let handler = Function::new("fragile_handler", move |state| {
        seen.fetch_add(1, Ordering::SeqCst);
        let message = state.get(1).cloned().unwrap_or_default();
        if message == Value::string("bad") {
            panic!("handler cannot cope");
        }
        state.push_value(Value::string(format!("handled: {}", message)));
        Ok(1)
    });
    let mut callable = protected(&state, failing("bad"));
    callable.set_error_handler(handler_ref(&state, handler));

    let result = callable.call(&mut state, ());

    assert_eq!(result.status(), CallStatus::Handler);
    assert_eq!(result.error_message().as_deref(), Some("handler cannot cope"));
    result.discard();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.top(), 0);
    assert_eq!(state.frame_depth(), 0);
}

#[test]
fn test_panic_inside_nested_native_call() {
    let mut state = State::new();
    state.set_global("explode", Value::Function(panicking("deep boom")));
    let outer = Function::new("outer", |state| {
        state.push_global("explode");
        state.call(0, 0)?;
        Ok(0)
    });

    let result = protected(&state, outer).call(&mut state, ());

    assert_eq!(result.status(), CallStatus::Runtime);
    assert_eq!(result.error_message().as_deref(), Some("deep boom"));
    result.discard();
    assert_eq!(state.frame_depth(), 0);
    assert_eq!(state.top(), 0);
}

// ============================================================================
// Typed returns
// ============================================================================

#[test]
fn test_typed_tuple() {
    let mut state = State::new();
    let callable = protected(&state, identity());

    let (a, b, c): (f64, String, bool) = callable.call_as(&mut state, (1.0, "two", true)).unwrap();

    assert_eq!((a, b.as_str(), c), (1.0, "two", true));
    assert_eq!(state.top(), 0);
}

#[test]
fn test_typed_single_and_void() {
    let mut state = State::new();
    let mut callable = protected(&state, identity());
    callable.set_error_handler(handler_ref(&state, prefixing_handler("!")));

    let n: i64 = callable.call_as(&mut state, (5, 6)).unwrap();
    assert_eq!(n, 5);

    callable.call_as::<(), _>(&mut state, "dropped").unwrap();

    let missing: Option<f64> = callable.call_as(&mut state, ()).unwrap();
    assert_eq!(missing, None);
    assert_eq!(state.top(), 0);
}

#[test]
fn test_typed_with_type_list() {
    let mut state = State::new();
    let callable = protected(&state, identity());

    let pair = callable
        .call_with(&mut state, Types::<(f64, f64)>::new(), (1.0, 2.0))
        .unwrap();
    assert_eq!(pair, (1.0, 2.0));
}

#[test]
fn test_typed_failure_is_reported() {
    let mut state = State::new();
    let mut callable = protected(&state, failing("nope"));
    callable.set_error_handler(handler_ref(&state, prefixing_handler("handled: ")));

    let err = callable.call_as::<f64, _>(&mut state, ()).unwrap_err();

    assert_eq!(
        err,
        CallError::Failed {
            status: CallStatus::Runtime,
            message: "handled: nope".to_string(),
        }
    );
    assert_eq!(state.top(), 0);
}

#[test]
fn test_typed_panic_is_reported() {
    let mut state = State::new();
    let callable = protected(&state, panicking("boom"));

    let err = callable.call_as::<(), _>(&mut state, ()).unwrap_err();

    assert_eq!(err.status(), CallStatus::Runtime);
    assert_eq!(err.to_string(), "runtime error: boom");
    assert_eq!(state.top(), 0);
}

#[test]
fn test_typed_conversion_failure() {
    let mut state = State::new();
    let callable = protected(&state, identity());

    let err = callable.call_as::<f64, _>(&mut state, "text").unwrap_err();

    assert!(matches!(err, CallError::Conversion(_)));
    assert_eq!(state.top(), 0);
}

// ============================================================================
// Error handlers
// ============================================================================

#[test]
fn test_handlers_are_independent() {
    let mut state = State::new();
    let default = handler_ref(&state, prefixing_handler("default: "));
    state.set_default_handler(default.clone());

    let mut first = protected(&state, failing("e"));
    let second = protected(&state, failing("e"));
    assert_eq!(first.error_handler(), &default);
    assert_eq!(second.error_handler(), &default);

    first.set_error_handler(handler_ref(&state, prefixing_handler("first: ")));

    assert_eq!(second.error_handler(), &default);
    assert_eq!(state.default_handler(), &default);

    let result = first.call(&mut state, ());
    assert_eq!(result.error_message().as_deref(), Some("first: e"));
    result.discard();

    let result = second.call(&mut state, ());
    assert_eq!(result.error_message().as_deref(), Some("default: e"));
    result.discard();

    first.clear_error_handler();
    let result = first.call(&mut state, ());
    assert_eq!(result.error_message().as_deref(), Some("e"));
}

#[test]
fn test_default_handler_copied_at_construction() {
    let mut state = State::new();
    let before = protected(&state, failing("e"));

    state.set_default_handler(handler_ref(&state, prefixing_handler("late: ")));
    let after = protected(&state, failing("e"));

    assert!(!before.error_handler().valid());
    assert!(after.error_handler().valid());
}

#[test]
fn test_handler_from_other_runtime_is_rejected() {
    let other = State::new();
    let mut state = State::new();
    let mut callable = protected(&state, identity());
    callable.set_error_handler(handler_ref(&other, prefixing_handler("x")));

    let result = callable.call(&mut state, 1.0);

    assert_eq!(result.status(), CallStatus::Runtime);
    assert_eq!(
        result.error_message().as_deref(),
        Some("error handler belongs to a different runtime")
    );
    result.discard();
    assert_eq!(state.top(), 0);
}

// ============================================================================
// Re-entrant calls
// ============================================================================

#[test]
fn test_reentrant_calls_pair_handler_slots() {
    let mut state = State::new();
    let inner_handler = prefixing_handler("inner: ");
    let mut inner = protected(&state, failing("deep"));
    inner.set_error_handler(handler_ref(&state, inner_handler.clone()));

    let outer_fn = NativeFunctionBuilder::new("outer")
        .with_arity(1)
        .with_implementation(move |state| {
            let before = state.top();
            let result = inner.call(state, ());
            let message = result.error_message().unwrap_or_default();
            result.discard();
            if state.top() != before {
                return Err(RuntimeError::message("inner call left the stack unbalanced"));
            }
            state.push_value(Value::string(message));
            Ok(1)
        })
        .build()
        .unwrap();

    let outer_handler = prefixing_handler("outer: ");
    let mut outer = protected(&state, outer_fn);
    outer.set_error_handler(handler_ref(&state, outer_handler.clone()));

    let result = outer.call(&mut state, "arg");

    assert_eq!(result.status(), CallStatus::Ok);
    assert_eq!(result.get::<String>(0).unwrap(), "inner: deep");
    result.discard();
    assert_eq!(state.top(), 0);
    assert!(!stack_contains(&state, &inner_handler));
    assert!(!stack_contains(&state, &outer_handler));
}

#[test]
fn test_reentrant_panic_stays_in_inner_call() {
    let mut state = State::new();
    let inner = protected(&state, panicking("inner boom"));

    let outer_fn = Function::new("outer", move |state| {
        let status = inner.call(state, ()).status();
        state.set_top(0);
        state.push_value(Value::Bool(status == CallStatus::Runtime));
        Ok(1)
    });

    let flag: bool = protected(&state, outer_fn).call_as(&mut state, ()).unwrap();

    assert!(flag);
    assert_eq!(state.frame_depth(), 0);
    assert_eq!(state.top(), 0);
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_strict_mode_rejects_non_function() {
    let mut state = State::with_config(RuntimeConfig::strict());
    state.push_value(Value::Number(1.0));

    let err = ProtectedFunction::from_stack(&state, 1).unwrap_err();
    assert_eq!(err, RuntimeError::type_error("expected function, got number"));

    assert!(ProtectedFunction::from_global(&state, "missing").is_err());
}

#[test]
fn test_strict_mode_accepts_function() {
    let mut state = State::with_config(RuntimeConfig::strict());
    state.set_global("identity", Value::Function(identity()));

    let callable = ProtectedFunction::from_global(&state, "identity").unwrap();
    let value: f64 = callable.call_as(&mut state, 8.0).unwrap();
    assert_eq!(value, 8.0);
}

#[test]
fn test_from_reference_checks_owner() {
    let other = State::new();
    let state = State::new();
    let reference = Reference::new(&other, Value::Function(identity()));

    assert!(ProtectedFunction::from_reference(&state, reference.clone()).is_err());
    assert!(ProtectedFunction::from_reference(&other, reference).is_ok());
}

#[test]
fn test_independent_runtimes_on_threads() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let mut state = State::new();
            let callable = ProtectedFunction::from_function(&state, identity());
            std::thread::spawn(move || {
                let n: f64 = callable.call_as(&mut state, f64::from(i)).unwrap();
                (n, state.top())
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let (n, top) = handle.join().unwrap();
        assert_eq!(n, i as f64);
        assert_eq!(top, 0);
    }
}
