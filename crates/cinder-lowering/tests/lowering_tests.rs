use super::*;
use crate::state::{FINISHED, NOT_STARTED_OR_RUNNING};
use cinder_bound::{BoundExpr, BoundStatement, IteratorKind, LabelId};

fn yield_int(value: i64) -> BoundStatement {
    BoundStatement::yield_return(BoundExpr::int(value))
}

fn yield_at(value: i64, syntax_offset: u32) -> BoundStatement {
    BoundStatement::YieldReturn {
        expr: BoundExpr::int(value),
        syntax_offset: Some(syntax_offset),
    }
}

fn call(name: &str) -> BoundStatement {
    BoundStatement::expr(BoundExpr::host_call(name, Vec::new()))
}

fn log(message: &str) -> BoundStatement {
    BoundStatement::expr(BoundExpr::host_call("Log", vec![BoundExpr::string(message)]))
}

fn try_finally(body: Vec<BoundStatement>, finally: Vec<BoundStatement>) -> BoundStatement {
    BoundStatement::try_finally(BoundStatement::block(body), BoundStatement::block(finally))
}

fn method(body: Vec<BoundStatement>) -> IteratorMethod {
    IteratorMethod::new("M", "int", IteratorKind::Enumerable, BoundStatement::block(body))
}

fn lower(method: &IteratorMethod) -> IteratorStateMachine {
    lower_iterator(method, &LoweringOptions::default()).unwrap()
}

/// `try { yield return 1; } finally { Cleanup(); } yield return 2;`
fn cleanup_scenario() -> IteratorMethod {
    method(vec![
        try_finally(vec![yield_int(1)], vec![call("Cleanup")]),
        yield_int(2),
    ])
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|v| Value::Int(*v)).collect()
}

// =============================================================================
// Scenario
// =============================================================================

#[test]
fn test_cleanup_scenario_shape() {
    let machine = lower(&cleanup_scenario());
    assert_eq!(machine.resumable_states, vec![1, 2]);
    assert_eq!(machine.finalize_states, vec![-3]);
    assert_eq!(machine.finally_methods.len(), 1);
}

#[test]
fn test_cleanup_scenario_dispose_inside_try() {
    let machine = lower(&cleanup_scenario());
    let mut runner = StateMachineRunner::new(&machine);

    assert_eq!(runner.enumerate(Some(1), true).unwrap(), ints(&[1]));
    assert_eq!(runner.trace(), ["Cleanup()"]);
}

#[test]
fn test_cleanup_scenario_dispose_after_try() {
    let machine = lower(&cleanup_scenario());
    let mut runner = StateMachineRunner::new(&machine);

    assert_eq!(runner.enumerate(Some(2), false).unwrap(), ints(&[1, 2]));
    assert_eq!(runner.take_trace(), ["Cleanup()"]);

    // suspended at the second yield, outside the try
    let enumerator = 0;
    assert_eq!(runner.state(enumerator).unwrap(), 2);
    runner.dispose(enumerator).unwrap();
    assert!(runner.trace().is_empty());
    assert_eq!(runner.state(enumerator).unwrap(), FINISHED);
}

#[test]
fn test_cleanup_scenario_full_enumeration() {
    let machine = lower(&cleanup_scenario());
    let mut runner = StateMachineRunner::new(&machine);
    assert_eq!(runner.enumerate(None, true).unwrap(), ints(&[1, 2]));
    assert_eq!(runner.trace(), ["Cleanup()"]);
}

// =============================================================================
// Dispatch
// =============================================================================

#[test]
fn test_resuming_runs_only_code_after_that_yield() {
    let machine = lower(&method(vec![
        log("a"),
        yield_int(1),
        log("b"),
        yield_int(2),
        log("c"),
    ]));
    assert_eq!(machine.resumable_states, vec![1, 2]);

    let expected = [(1, "Log(\"b\")", true), (2, "Log(\"c\")", false)];
    for (state, trace, more) in expected {
        let mut runner = StateMachineRunner::new(&machine);
        let enumerator = runner.kick_off().unwrap();
        let enumerator = runner.get_enumerator(enumerator).unwrap();
        runner.set_state(enumerator, state).unwrap();

        assert_eq!(runner.move_next(enumerator).unwrap(), more);
        assert_eq!(runner.trace(), [trace], "resuming state {state}");
    }
}

#[test]
fn test_loop_with_yield() {
    // i = 0; top: if (!(i < 3)) goto done; yield return i; i = i + 1; goto top; done:
    let (top, done) = (LabelId(0), LabelId(1));
    let i = cinder_bound::LocalId(0);
    let body = vec![
        BoundStatement::assign(BoundExpr::local(i), BoundExpr::int(0)),
        BoundStatement::label(top),
        BoundStatement::ConditionalGoto {
            condition: BoundExpr::binary(
                BoundExpr::local(i),
                cinder_bound::BinaryOp::Lt,
                BoundExpr::int(3),
            ),
            jump_if_true: false,
            label: done,
        },
        BoundStatement::yield_return(BoundExpr::local(i)),
        BoundStatement::assign(
            BoundExpr::local(i),
            BoundExpr::binary(BoundExpr::local(i), cinder_bound::BinaryOp::Add, BoundExpr::int(1)),
        ),
        BoundStatement::goto(top),
        BoundStatement::label(done),
    ];
    let method = method(body).with_labels(&["top", "done"]).with_locals(&["i"]);
    let machine = lower(&method);

    let mut runner = StateMachineRunner::new(&machine);
    assert_eq!(runner.enumerate(None, true).unwrap(), ints(&[0, 1, 2]));
}

#[test]
fn test_locals_missing_from_name_table_are_rejected() {
    // the synthesized cachedState local must not share an id with `i`
    let i = cinder_bound::LocalId(0);
    let method = method(vec![
        BoundStatement::assign(BoundExpr::local(i), BoundExpr::int(0)),
        BoundStatement::yield_return(BoundExpr::local(i)),
    ]);

    let err = lower_iterator(&method, &LoweringOptions::default()).unwrap_err();
    assert_eq!(
        err,
        LoweringError::NameTableTooShort {
            kind: "local",
            id: 0,
            declared: 0,
        }
    );
    assert_eq!(err.to_string(), "local #0 is used but the method names only 0 locals");

    let machine = lower(&method.with_locals(&["i"]));
    let mut runner = StateMachineRunner::new(&machine);
    assert_eq!(runner.enumerate(None, true).unwrap(), ints(&[0]));
}

#[test]
fn test_labels_missing_from_name_table_are_rejected() {
    let (top, done) = (LabelId(0), LabelId(1));
    let method = method(vec![
        BoundStatement::label(top),
        yield_int(1),
        BoundStatement::goto(done),
        BoundStatement::goto(top),
        BoundStatement::label(done),
    ])
    .with_labels(&["top"]);

    assert_eq!(
        lower_iterator(&method, &LoweringOptions::default()).unwrap_err(),
        LoweringError::NameTableTooShort {
            kind: "label",
            id: 1,
            declared: 1,
        }
    );
}

// =============================================================================
// Finally blocks
// =============================================================================

#[test]
fn test_finally_runs_once_on_fallthrough() {
    let machine = lower(&method(vec![
        try_finally(vec![yield_int(1), yield_int(2)], vec![call("Cleanup")]),
        log("after"),
    ]));
    let mut runner = StateMachineRunner::new(&machine);

    assert_eq!(runner.enumerate(None, true).unwrap(), ints(&[1, 2]));
    assert_eq!(runner.trace(), ["Cleanup()", "Log(\"after\")"]);
}

#[test]
fn test_finally_runs_once_on_goto_out() {
    let done = LabelId(0);
    let method = method(vec![
        try_finally(
            vec![yield_int(1), BoundStatement::goto(done), yield_int(99)],
            vec![call("Cleanup")],
        ),
        yield_int(2),
        BoundStatement::label(done),
        log("done"),
    ])
    .with_labels(&["done"]);
    let machine = lower(&method);
    let mut runner = StateMachineRunner::new(&machine);

    assert_eq!(runner.enumerate(None, true).unwrap(), ints(&[1]));
    assert_eq!(runner.trace(), ["Cleanup()", "Log(\"done\")"]);
}

#[test]
fn test_goto_out_of_nested_trys_runs_both_finally_blocks() {
    let done = LabelId(0);
    let method = method(vec![
        try_finally(
            vec![try_finally(
                vec![yield_int(1), BoundStatement::goto(done)],
                vec![call("Inner")],
            )],
            vec![call("Outer")],
        ),
        BoundStatement::label(done),
    ])
    .with_labels(&["done"]);
    let machine = lower(&method);
    let mut runner = StateMachineRunner::new(&machine);

    assert_eq!(runner.enumerate(None, true).unwrap(), ints(&[1]));
    assert_eq!(runner.trace(), ["Inner()", "Outer()"]);
}

#[test]
fn test_yield_break_inside_try_runs_finally() {
    let machine = lower(&method(vec![
        try_finally(
            vec![yield_int(1), BoundStatement::YieldBreak, yield_int(2)],
            vec![call("Cleanup")],
        ),
        yield_int(3),
    ]));
    let mut runner = StateMachineRunner::new(&machine);

    assert_eq!(runner.enumerate(None, true).unwrap(), ints(&[1]));
    assert_eq!(runner.trace(), ["Cleanup()"]);
}

#[test]
fn test_exception_runs_finally_and_finishes() {
    let machine = lower(&method(vec![try_finally(
        vec![yield_int(1), call("Boom"), yield_int(2)],
        vec![call("Cleanup")],
    )]));
    let mut runner = StateMachineRunner::new(&machine).fail_on("Boom");

    let enumerable = runner.kick_off().unwrap();
    let enumerator = runner.get_enumerator(enumerable).unwrap();
    assert!(runner.move_next(enumerator).unwrap());
    assert_eq!(
        runner.move_next(enumerator).unwrap_err(),
        RunError::Unhandled("Boom failed".to_string())
    );
    assert_eq!(runner.take_trace(), ["Boom()", "Cleanup()"]);
    assert_eq!(runner.state(enumerator).unwrap(), FINISHED);

    // nothing left to clean up
    runner.dispose(enumerator).unwrap();
    assert!(!runner.move_next(enumerator).unwrap());
    assert!(runner.trace().is_empty());
}

#[test]
fn test_throwing_inner_finally_still_runs_outer_on_dispose() {
    let machine = lower(&method(vec![try_finally(
        vec![try_finally(vec![yield_int(1)], vec![call("Inner")])],
        vec![call("Outer")],
    )]));
    let mut runner = StateMachineRunner::new(&machine).fail_on("Inner");

    let enumerable = runner.kick_off().unwrap();
    let enumerator = runner.get_enumerator(enumerable).unwrap();
    assert!(runner.move_next(enumerator).unwrap());
    assert_eq!(
        runner.dispose(enumerator).unwrap_err(),
        RunError::Unhandled("Inner failed".to_string())
    );
    assert_eq!(runner.trace(), ["Inner()", "Outer()"]);
}

// =============================================================================
// Dispose
// =============================================================================

#[test]
fn test_dispose_after_completion_runs_nothing() {
    let machine = lower(&cleanup_scenario());
    let mut runner = StateMachineRunner::new(&machine);

    let enumerable = runner.kick_off().unwrap();
    let enumerator = runner.get_enumerator(enumerable).unwrap();
    while runner.move_next(enumerator).unwrap() {}
    assert_eq!(runner.state(enumerator).unwrap(), NOT_STARTED_OR_RUNNING);
    assert_eq!(runner.take_trace(), ["Cleanup()"]);

    runner.dispose(enumerator).unwrap();
    runner.dispose(enumerator).unwrap();
    assert!(runner.trace().is_empty());
    assert_eq!(runner.state(enumerator).unwrap(), FINISHED);
}

#[test]
fn test_dispose_twice_runs_finally_once() {
    let machine = lower(&cleanup_scenario());
    let mut runner = StateMachineRunner::new(&machine);

    let enumerable = runner.kick_off().unwrap();
    let enumerator = runner.get_enumerator(enumerable).unwrap();
    assert!(runner.move_next(enumerator).unwrap());
    runner.dispose(enumerator).unwrap();
    runner.dispose(enumerator).unwrap();
    assert!(!runner.move_next(enumerator).unwrap());
    assert_eq!(runner.trace(), ["Cleanup()"]);
}

#[test]
fn test_nested_dispose_runs_innermost_first() {
    let machine = lower(&method(vec![try_finally(
        vec![
            yield_int(1),
            try_finally(vec![yield_int(2)], vec![call("B")]),
            yield_int(3),
        ],
        vec![call("A")],
    )]));

    // suspended inside B
    let mut runner = StateMachineRunner::new(&machine);
    assert_eq!(runner.enumerate(Some(2), true).unwrap(), ints(&[1, 2]));
    assert_eq!(runner.trace(), ["B()", "A()"]);

    // suspended inside A only
    let mut runner = StateMachineRunner::new(&machine);
    assert_eq!(runner.enumerate(Some(1), true).unwrap(), ints(&[1]));
    assert_eq!(runner.trace(), ["A()"]);

    // suspended after B completed
    let mut runner = StateMachineRunner::new(&machine);
    assert_eq!(runner.enumerate(Some(3), true).unwrap(), ints(&[1, 2, 3]));
    assert_eq!(runner.trace(), ["B()", "A()"]);
}

#[test]
fn test_dispose_without_trys_is_noop() {
    let machine = lower(&method(vec![yield_int(1)]));
    let dispose = machine.body(machine.members.dispose).unwrap();
    assert_eq!(dispose, &BoundStatement::block(vec![BoundStatement::ret(None)]));
}

// =============================================================================
// GetEnumerator
// =============================================================================

#[test]
fn test_second_get_enumerator_returns_fresh_instance() {
    let machine = lower(&method(vec![yield_int(1), yield_int(2)]));
    let mut runner = StateMachineRunner::new(&machine);

    let enumerable = runner.kick_off().unwrap();
    let first = runner.get_enumerator(enumerable).unwrap();
    let second = runner.get_enumerator(enumerable).unwrap();
    assert_eq!(first, enumerable);
    assert_ne!(second, first);

    assert!(runner.move_next(first).unwrap());
    assert!(runner.move_next(first).unwrap());
    assert!(runner.move_next(second).unwrap());
    assert_eq!(runner.current(first).unwrap(), Value::Int(2));
    assert_eq!(runner.current(second).unwrap(), Value::Int(1));
}

#[test]
fn test_get_enumerator_on_other_thread_returns_fresh_instance() {
    let machine = lower(&method(vec![yield_int(1)]));
    let mut runner = StateMachineRunner::new(&machine);

    let enumerable = runner.kick_off().unwrap();
    runner.set_thread_id(2);
    let enumerator = runner.get_enumerator(enumerable).unwrap();
    assert_ne!(enumerator, enumerable);
    assert_eq!(runner.state(enumerable).unwrap(), FINISHED);
}

#[test]
fn test_get_enumerator_ignores_thread_when_not_tracked() {
    let options = LoweringOptions {
        track_initial_thread: false,
        ..LoweringOptions::default()
    };
    let machine = lower_iterator(&method(vec![yield_int(1)]), &options).unwrap();
    let mut runner = StateMachineRunner::new(&machine);

    let enumerable = runner.kick_off().unwrap();
    runner.set_thread_id(2);
    assert_eq!(runner.get_enumerator(enumerable).unwrap(), enumerable);
}

// =============================================================================
// Stable states
// =============================================================================

#[test]
fn test_previous_states_survive_an_inserted_yield() {
    let before = method(vec![yield_at(1, 10), yield_at(2, 20)]);
    let first = lower(&before);
    assert_eq!(first.resumable_states, vec![1, 2]);

    let after = method(vec![yield_at(1, 10), yield_at(3, 15), yield_at(2, 20)]);
    let options = LoweringOptions::default().with_previous_states(
        first
            .state_map
            .iter()
            .map(|entry| (entry.syntax_offset, entry.state)),
    );
    let second = lower_iterator(&after, &options).unwrap();
    assert_eq!(second.resumable_states, vec![1, 3, 2]);

    let mut runner = StateMachineRunner::new(&second);
    assert_eq!(runner.enumerate(None, true).unwrap(), ints(&[1, 3, 2]));
}

#[test]
fn test_previous_finalize_state_is_kept() {
    let body = |extra: bool| {
        let mut statements = Vec::new();
        if extra {
            statements.push(BoundStatement::Try {
                try_block: Box::new(BoundStatement::block(vec![yield_at(0, 2)])),
                catch_blocks: Vec::new(),
                finally_block: Some(Box::new(BoundStatement::empty())),
                prefer_fault_handler: false,
                syntax_offset: Some(1),
            });
        }
        statements.push(BoundStatement::Try {
            try_block: Box::new(BoundStatement::block(vec![yield_at(1, 10)])),
            catch_blocks: Vec::new(),
            finally_block: Some(Box::new(BoundStatement::block(vec![call("Cleanup")]))),
            prefer_fault_handler: false,
            syntax_offset: Some(5),
        });
        method(statements)
    };

    let first = lower(&body(false));
    assert_eq!(first.finalize_states, vec![-3]);

    let options = LoweringOptions::default().with_previous_states(
        first
            .state_map
            .iter()
            .map(|entry| (entry.syntax_offset, entry.state)),
    );
    let second = lower_iterator(&body(true), &options).unwrap();
    assert_eq!(second.finalize_states, vec![-4, -3]);
    assert_eq!(second.resumable_states, vec![2, 1]);
}

// =============================================================================
// Entry points
// =============================================================================

#[test]
fn test_conditional_goto_out_of_yielding_try_is_rejected() {
    let done = LabelId(0);
    let method = method(vec![
        try_finally(
            vec![
                yield_int(1),
                BoundStatement::ConditionalGoto {
                    condition: BoundExpr::bool(true),
                    jump_if_true: true,
                    label: done,
                },
            ],
            vec![call("Cleanup")],
        ),
        BoundStatement::label(done),
    ])
    .with_labels(&["done"]);

    let err = lower_iterator(&method, &LoweringOptions::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "conditional branch to 'done' leaves a try block containing 'yield return' without running its finally block"
    );
}

#[test]
fn test_lower_iterators_keeps_order_and_ordinals() {
    let methods = vec![
        IteratorMethod::new("A", "int", IteratorKind::Enumerable, BoundStatement::block(vec![yield_int(1)])),
        IteratorMethod::new(
            "B",
            "int",
            IteratorKind::Enumerator,
            BoundStatement::block(vec![BoundStatement::ret(Some(BoundExpr::int(1)))]),
        ),
        IteratorMethod::new("C", "string", IteratorKind::Enumerator, BoundStatement::block(vec![yield_int(2)])),
    ];

    let results = lower_iterators(&methods, &LoweringOptions::default());
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().name, "<A>d__0");
    assert_eq!(results[1].as_ref().unwrap_err(), &LoweringError::ReturnWithValue);
    assert_eq!(results[2].as_ref().unwrap().name, "<C>d__2");
}

#[test]
fn test_lower_iterators_with_per_method_options() {
    let body = || BoundStatement::block(vec![yield_at(1, 10), yield_at(2, 20)]);
    let methods = vec![
        IteratorMethod::new("A", "int", IteratorKind::Enumerable, body()),
        IteratorMethod::new("B", "int", IteratorKind::Enumerable, body()),
    ];

    let results = lower_iterators_with(&methods, |method| {
        let options = LoweringOptions::default();
        if method.name == "A" {
            options.with_previous_states([(10, 2), (20, 1)])
        } else {
            options
        }
    });

    let states = |index: usize| {
        let machine = results[index].as_ref().unwrap();
        machine
            .state_map
            .iter()
            .map(|entry| (entry.syntax_offset, entry.state))
            .collect::<Vec<_>>()
    };
    assert_eq!(results[0].as_ref().unwrap().name, "<A>d__0");
    assert_eq!(results[1].as_ref().unwrap().name, "<B>d__1");
    assert_eq!(states(0), [(10, 2), (20, 1)]);
    assert_eq!(states(1), [(10, 1), (20, 2)]);
}

#[test]
fn test_machine_serializes_to_json() {
    let machine = lower(&cleanup_scenario());
    let json = serde_json::to_value(&machine).unwrap();

    assert_eq!(json["name"], "<M>d__0");
    assert_eq!(json["kind"], "enumerable");
    assert_eq!(json["resumable_states"], serde_json::json!([1, 2]));
    assert_eq!(json["finalize_states"], serde_json::json!([-3]));

    let back: IteratorStateMachine = serde_json::from_value(json).unwrap();
    assert_eq!(back, machine);
}
