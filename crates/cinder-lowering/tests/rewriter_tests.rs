use super::*;
use cinder_bound::{BoundPrinter, BoundTables, IteratorKind, IteratorMethod};
use rustc_hash::FxHashMap;

fn yield_int(value: i64) -> BoundStatement {
    BoundStatement::yield_return(BoundExpr::int(value))
}

fn call(name: &str) -> BoundStatement {
    BoundStatement::expr(BoundExpr::host_call(name, Vec::new()))
}

fn try_finally(body: Vec<BoundStatement>, finally: Vec<BoundStatement>) -> BoundStatement {
    BoundStatement::try_finally(BoundStatement::block(body), BoundStatement::block(finally))
}

fn method(body: Vec<BoundStatement>) -> IteratorMethod {
    IteratorMethod::new("M", "int", IteratorKind::Enumerable, BoundStatement::block(body))
}

fn rewrite(method: &IteratorMethod) -> Result<(RewrittenIterator, BoundTables), LoweringError> {
    let analysis = YieldsInTryAnalysis::analyze(&method.body, &method.labels)?;
    rewrite_with(method, &analysis)
}

fn rewrite_with(
    method: &IteratorMethod,
    analysis: &YieldsInTryAnalysis,
) -> Result<(RewrittenIterator, BoundTables), LoweringError> {
    let mut factory = BoundFactory::for_method(method);
    let fields = StateFields {
        state: factory.add_field("state", "int"),
        current: factory.add_field("current", "int"),
    };
    let move_next = factory.open_method("MoveNext", MethodKind::MoveNext, "bool", &[]);
    let dispose = factory.open_method("Dispose", MethodKind::Dispose, "void", &[]);
    factory.set_current_method(Some(move_next));

    let rewritten = IteratorBodyRewriter::new(
        &mut factory,
        analysis,
        StateDispatcher::new(&FxHashMap::default()),
        fields,
        dispose,
    )
    .rewrite(&method.body)?;
    Ok((rewritten, factory.finish()))
}

fn print(tables: &BoundTables, statement: &BoundStatement) -> String {
    BoundPrinter::emit_to_string(tables, statement)
}

fn method_body(tables: &BoundTables, method: MethodId) -> String {
    let body = tables.method(method).and_then(|m| m.body.as_ref()).unwrap();
    print(tables, body)
}

#[test]
fn test_yields_outside_trys_return_directly() {
    let (rewritten, tables) = rewrite(&method(vec![yield_int(1), yield_int(2)])).unwrap();
    let move_next = print(&tables, &rewritten.move_next_body);

    assert!(move_next.contains("cachedState = this.state;"));
    assert!(move_next.contains("switch (cachedState)"));
    assert!(move_next.contains("case 0:\n"));
    assert!(move_next.contains("goto initial_0;"));
    assert!(move_next.contains("goto resume_1;"));
    assert!(move_next.contains("goto resume_2;"));
    assert!(move_next.contains("this.current = 1;"));
    assert!(move_next.contains("this.state = 2;"));
    assert_eq!(move_next.matches("return true;").count(), 2);
    assert_eq!(move_next.matches("return false;").count(), 2);
    assert!(!move_next.contains("exitLabel"));
    assert!(!move_next.contains("fault"));

    assert_eq!(rewritten.resumable_states, vec![1, 2]);
    assert!(rewritten.finalize_states.is_empty());
    assert!(rewritten.finally_methods.is_empty());
    assert_eq!(
        rewritten.dispose_body,
        BoundStatement::block(vec![BoundStatement::ret(None)])
    );
}

#[test]
fn test_resume_resets_state_to_frame_finalize_state() {
    let (rewritten, tables) = rewrite(&method(vec![
        try_finally(vec![yield_int(1)], vec![call("Cleanup")]),
        yield_int(2),
    ]))
    .unwrap();
    let move_next = print(&tables, &rewritten.move_next_body);

    // labels: initial_0, resume_1, exitLabel_2, resume_3
    let after_first = move_next.split("resume_1:").nth(1).unwrap();
    assert!(after_first.trim_start().starts_with("this.state = -3;"));
    let after_second = move_next.split("resume_3:").nth(1).unwrap();
    assert!(after_second.trim_start().starts_with("this.state = -1;"));
}

#[test]
fn test_try_with_yield_moves_finally_into_helper() {
    let (rewritten, tables) = rewrite(&method(vec![
        try_finally(vec![yield_int(1)], vec![call("Cleanup")]),
        yield_int(2),
    ]))
    .unwrap();

    assert_eq!(rewritten.resumable_states, vec![1, 2]);
    assert_eq!(rewritten.finalize_states, vec![-3]);
    assert_eq!(rewritten.finally_methods.len(), 1);

    let finally = rewritten.finally_methods[0];
    assert_eq!(tables.method_name(finally), "<>m__Finally1");
    let helper = method_body(&tables, finally);
    assert!(helper.contains("this.state = -1;"));
    assert!(helper.contains("Cleanup();"));
    assert!(helper.contains("return;"));

    let move_next = print(&tables, &rewritten.move_next_body);
    assert!(move_next.contains("this.state = -3;"));
    assert!(move_next.contains("this.<>m__Finally1();"));
    assert!(!move_next.contains("Cleanup();"));
}

#[test]
fn test_yield_in_try_wraps_move_next_in_fault() {
    let (rewritten, tables) = rewrite(&method(vec![try_finally(
        vec![yield_int(1)],
        vec![call("Cleanup")],
    )]))
    .unwrap();

    let BoundStatement::Block(outer) = &rewritten.move_next_body else {
        panic!("expected a block");
    };
    assert_eq!(outer.len(), 3);
    assert!(matches!(
        &outer[0],
        BoundStatement::Try {
            prefer_fault_handler: true,
            ..
        }
    ));
    assert!(matches!(outer[1], BoundStatement::Label(_)));
    assert!(matches!(outer[2], BoundStatement::Return(Some(BoundExpr::Local(_)))));

    let move_next = print(&tables, &rewritten.move_next_body);
    assert!(move_next.contains("fault"));
    assert!(move_next.contains("this.Dispose();"));
    assert!(move_next.contains("methodValue = true;"));
    assert!(move_next.contains("return methodValue;"));
    assert!(!move_next.contains("return true;"));
}

#[test]
fn test_dispose_dispatches_to_handler() {
    let (rewritten, tables) = rewrite(&method(vec![
        try_finally(vec![yield_int(1)], vec![call("Cleanup")]),
        yield_int(2),
    ]))
    .unwrap();
    let dispose = print(&tables, &rewritten.dispose_body);

    assert!(dispose.contains("disposeState = this.state;"));
    assert!(dispose.contains("switch (disposeState)"));
    assert!(dispose.contains("case -3:"));
    assert!(dispose.contains("case 1:"));
    assert!(!dispose.contains("case 2:"));
    assert!(dispose.contains("this.<>m__Finally1();"));
    assert!(dispose.contains("this.state = -2;"));
}

#[test]
fn test_nested_trys_chain_finalize_states() {
    let (rewritten, tables) = rewrite(&method(vec![try_finally(
        vec![
            yield_int(1),
            try_finally(vec![yield_int(2)], vec![call("Inner")]),
        ],
        vec![call("Outer")],
    )]))
    .unwrap();

    assert_eq!(rewritten.finalize_states, vec![-3, -4]);
    let outer = method_body(&tables, rewritten.finally_methods[0]);
    let inner = method_body(&tables, rewritten.finally_methods[1]);
    assert!(outer.contains("this.state = -1;") && outer.contains("Outer();"));
    assert!(inner.contains("this.state = -3;") && inner.contains("Inner();"));

    let dispose = print(&tables, &rewritten.dispose_body);
    // the inner handler's dispatch is nested inside the outer handler's try
    let inner_call = dispose.find("this.<>m__Finally2();").unwrap();
    let outer_call = dispose.find("this.<>m__Finally1();").unwrap();
    assert!(inner_call < outer_call);
    assert!(dispose.contains("case -4:"));
}

#[test]
fn test_goto_out_of_try_goes_through_proxy() {
    let done = LabelId(0);
    let method = method(vec![
        try_finally(
            vec![yield_int(1), BoundStatement::goto(done)],
            vec![call("Cleanup")],
        ),
        yield_int(2),
        BoundStatement::label(done),
    ])
    .with_labels(&["done"]);
    let (rewritten, tables) = rewrite(&method).unwrap();
    let move_next = print(&tables, &rewritten.move_next_body);

    assert!(move_next.contains("goto proxy_done_"));
    assert!(move_next.contains("goto dropThrough_"));
    assert!(move_next.contains("goto done;"));
    // once on fallthrough, once at the proxy
    assert_eq!(move_next.matches("this.<>m__Finally1();").count(), 2);
}

#[test]
fn test_goto_within_try_is_not_proxied() {
    let again = LabelId(0);
    let method = method(vec![try_finally(
        vec![
            BoundStatement::label(again),
            yield_int(1),
            BoundStatement::goto(again),
        ],
        vec![],
    )])
    .with_labels(&["again"]);
    let (rewritten, tables) = rewrite(&method).unwrap();
    let move_next = print(&tables, &rewritten.move_next_body);

    assert!(move_next.contains("goto again;"));
    assert!(!move_next.contains("proxy_again"));
    assert!(!move_next.contains("dropThrough"));
}

#[test]
fn test_yield_break_in_try_exits_through_proxy() {
    let (rewritten, tables) = rewrite(&method(vec![try_finally(
        vec![yield_int(1), BoundStatement::YieldBreak],
        vec![call("Cleanup")],
    )]))
    .unwrap();
    let move_next = print(&tables, &rewritten.move_next_body);

    assert!(move_next.contains("methodValue = false;"));
    assert!(move_next.contains("goto proxy_exitLabel_"));
}

#[test]
fn test_try_without_yield_stays_a_try() {
    let (rewritten, tables) = rewrite(&method(vec![
        try_finally(vec![call("Work")], vec![call("Cleanup")]),
        yield_int(1),
    ]))
    .unwrap();
    let move_next = print(&tables, &rewritten.move_next_body);

    assert!(move_next.contains("try\n"));
    assert!(move_next.contains("finally\n"));
    assert!(move_next.contains("Cleanup();"));
    assert!(rewritten.finally_methods.is_empty());
    assert!(!move_next.contains("fault"));
}

#[test]
fn test_try_unknown_to_analysis_is_an_error() {
    let method = method(vec![try_finally(vec![yield_int(1)], vec![])]);
    let empty = YieldsInTryAnalysis::analyze(&BoundStatement::empty(), &[]).unwrap();

    let err = rewrite_with(&method, &empty).unwrap_err();
    assert_eq!(err, LoweringError::UnknownTryStatement { ordinal: 0 });
}

#[test]
fn test_return_with_value_is_an_error() {
    let method = method(vec![BoundStatement::ret(Some(BoundExpr::int(1)))]);
    let analysis = YieldsInTryAnalysis::default();
    let err = rewrite_with(&method, &analysis).unwrap_err();
    assert_eq!(err, LoweringError::ReturnWithValue);
}
