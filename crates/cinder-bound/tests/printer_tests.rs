use super::*;
use crate::factory::{BoundFactory, FieldDef, MethodKind};
use crate::ids::{FieldId, LabelId, LocalId};
use crate::tree::{BinaryOp, BoundSwitchSection};

fn tables_with(labels: &[&str], locals: &[&str], fields: &[&str]) -> BoundTables {
    let names = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
    BoundTables {
        labels: names(labels),
        locals: names(locals),
        fields: fields
            .iter()
            .map(|f| FieldDef {
                name: (*f).to_string(),
                type_name: "int".to_string(),
            })
            .collect(),
        methods: Vec::new(),
    }
}

#[test]
fn test_labels_are_outdented() {
    let tables = tables_with(&["top"], &["i"], &[]);
    let i = BoundExpr::local(LocalId(0));
    let stmt = BoundStatement::block(vec![
        BoundStatement::label(LabelId(0)),
        BoundStatement::assign(i.clone(), BoundExpr::int(1)),
        BoundStatement::ConditionalGoto {
            condition: BoundExpr::binary(i, BinaryOp::Lt, BoundExpr::int(3)),
            jump_if_true: false,
            label: LabelId(0),
        },
        BoundStatement::ret(Some(BoundExpr::bool(false))),
    ]);

    let output = BoundPrinter::emit_to_string(&tables, &stmt);
    assert_eq!(
        output,
        "{\n\
         top:\n    \
         i = 1;\n    \
         if (!(i < 3)) goto top;\n    \
         return false;\n\
         }\n"
    );
}

#[test]
fn test_method_signature_and_parameters() {
    let mut factory = BoundFactory::new();
    let state = factory.add_field("state", "int");
    let ctor = factory.open_method("<M>d__0", MethodKind::Constructor, "", &["state"]);
    factory.close_method(
        ctor,
        BoundStatement::block(vec![BoundStatement::assign_field(
            state,
            BoundExpr::Parameter(0),
        )]),
    );
    let tables = factory.finish();
    let method = tables.method(ctor).expect("constructor exists");

    assert_eq!(
        BoundPrinter::method_to_string(&tables, method),
        "<M>d__0(int state)\n{\n    this.state = state;\n}\n"
    );
}

#[test]
fn test_switch_try_fault_and_calls() {
    let mut factory = BoundFactory::new();
    let finally = factory.open_method("Finally1", MethodKind::Finally, "void", &[]);
    let done = factory.generate_label("done");
    let s = factory.synthesized_local("s");
    let tables = factory.finish();

    let stmt = BoundStatement::block(vec![
        BoundStatement::Switch {
            expression: BoundExpr::local(s),
            sections: vec![BoundSwitchSection {
                values: vec![1, -3],
                body: vec![BoundStatement::goto(done)],
            }],
        },
        BoundStatement::try_fault(
            BoundStatement::block(vec![BoundStatement::expr(BoundExpr::call_this(finally))]),
            BoundStatement::expr(BoundExpr::host_call(
                "Log",
                vec![BoundExpr::string("x"), BoundExpr::null()],
            )),
        ),
        BoundStatement::label(done),
    ]);

    let expected = [
        "{",
        "    switch (s)",
        "    {",
        "        case 1:",
        "        case -3:",
        "            goto done_0;",
        "    }",
        "    try",
        "    {",
        "        this.Finally1();",
        "    }",
        "    fault",
        "    {",
        "        Log(\"x\", null);",
        "    }",
        "done_0:",
        "}",
        "",
    ]
    .join("\n");
    assert_eq!(BoundPrinter::emit_to_string(&tables, &stmt), expected);
}

#[test]
fn test_compound_operands_are_parenthesized() {
    let tables = tables_with(&[], &["i"], &["current"]);
    let i = BoundExpr::local(LocalId(0));
    let expr = BoundExpr::assign(
        BoundExpr::this_field(FieldId(0)),
        BoundExpr::binary(
            BoundExpr::binary(i.clone(), BinaryOp::Add, BoundExpr::int(1)),
            BinaryOp::Mul,
            BoundExpr::int(2),
        ),
    );
    let mut printer = BoundPrinter::new(&tables);
    printer.emit_expr(&expr);
    printer.emit_expr(&BoundExpr::not(BoundExpr::binary(
        i,
        BinaryOp::Eq,
        BoundExpr::int(0),
    )));
    assert_eq!(printer.finish(), "this.current = (i + 1) * 2!(i == 0)");
}

#[test]
fn test_yield_statements_and_new() {
    let tables = BoundTables::default();
    let stmt = BoundStatement::block(vec![
        BoundStatement::yield_return(BoundExpr::int(7)),
        BoundStatement::YieldBreak,
        BoundStatement::Throw(BoundExpr::new_object("NotSupportedException", vec![])),
    ]);
    assert_eq!(
        BoundPrinter::emit_to_string(&tables, &stmt),
        "{\n    yield return 7;\n    yield break;\n    throw new NotSupportedException();\n}\n"
    );
}
