//! Assembly of the iterator state machine class.
//!
//! ```text
//! class <M>d__0 : IEnumerable<int>, IEnumerator<int>
//! {
//!     int state;
//!     int current;
//!     int initialThreadId;
//!
//!     <M>d__0(int state) { ... }
//!     bool MoveNext() { ... }
//!     void <>m__Finally1() { ... }
//!     void Dispose() { ... }
//!     int get_Current() { ... }
//!     void Reset() { ... }
//!     IEnumerator<int> GetEnumerator() { ... }
//! }
//! ```
//!
//! The kick-off method replaces the body of the original iterator method and
//! only constructs the machine.

use crate::dispatcher::{StateDispatcher, StateMapEntry};
use crate::error::LoweringError;
use crate::options::LoweringOptions;
use crate::rewriter::{IteratorBodyRewriter, StateFields};
use crate::state::{FINISHED, INITIAL, INITIAL_ENUMERABLE, StateNumber};
use crate::yields_in_try::YieldsInTryAnalysis;
use cinder_bound::{
    BinaryOp, BoundExpr, BoundFactory, BoundPrinter, BoundStatement, BoundTables, FieldId,
    IteratorKind, IteratorMethod, MethodId, MethodKind, SynthesizedMethod,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Host call returning the id of the calling thread.
pub const CURRENT_THREAD_ID: &str = "Environment.CurrentManagedThreadId";

/// Host type thrown by `Reset`.
pub const NOT_SUPPORTED_EXCEPTION: &str = "NotSupportedException";

/// The synthesized members every machine has.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineMembers {
    pub kick_off: MethodId,
    pub constructor: MethodId,
    pub move_next: MethodId,
    pub dispose: MethodId,
    pub current_getter: MethodId,
    pub reset: MethodId,
    /// Only for `IEnumerable<T>` iterators.
    pub get_enumerator: Option<MethodId>,
}

/// A lowered iterator method.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IteratorStateMachine {
    pub name: String,
    pub method_name: String,
    pub kind: IteratorKind,
    pub element_type: String,
    pub state_field: FieldId,
    pub current_field: FieldId,
    pub initial_thread_id_field: Option<FieldId>,
    pub members: MachineMembers,
    pub finally_methods: Vec<MethodId>,
    pub resumable_states: Vec<StateNumber>,
    pub finalize_states: Vec<StateNumber>,
    pub state_map: Vec<StateMapEntry>,
    pub tables: BoundTables,
}

impl IteratorStateMachine {
    pub fn method(&self, method: MethodId) -> Option<&SynthesizedMethod> {
        self.tables.method(method)
    }

    pub fn body(&self, method: MethodId) -> Option<&BoundStatement> {
        self.method(method).and_then(|m| m.body.as_ref())
    }

    /// Pseudo-C# rendering of the class and the kick-off method.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let interfaces = match self.kind {
            IteratorKind::Enumerable => format!(
                "IEnumerable<{0}>, IEnumerator<{0}>",
                self.element_type
            ),
            IteratorKind::Enumerator => format!("IEnumerator<{}>", self.element_type),
        };
        let _ = writeln!(out, "class {} : {}", self.name, interfaces);
        out.push_str("{\n");
        for field in &self.tables.fields {
            let _ = writeln!(out, "    {} {};", field.type_name, field.name);
        }

        let members = [
            Some(self.members.constructor),
            Some(self.members.move_next),
        ]
        .into_iter()
        .chain(self.finally_methods.iter().copied().map(Some))
        .chain([
            Some(self.members.dispose),
            Some(self.members.current_getter),
            Some(self.members.reset),
            self.members.get_enumerator,
        ])
        .flatten();
        for id in members {
            if let Some(method) = self.method(id) {
                out.push('\n');
                let mut printer = BoundPrinter::new(&self.tables);
                printer.set_indent_level(1);
                printer.emit_method(method);
                out.push_str(&printer.finish());
            }
        }
        out.push_str("}\n");

        if let Some(kick_off) = self.method(self.members.kick_off) {
            out.push('\n');
            out.push_str(&BoundPrinter::method_to_string(&self.tables, kick_off));
        }
        out
    }
}

pub struct StateMachineShapeBuilder<'a> {
    method: &'a IteratorMethod,
    options: &'a LoweringOptions,
    ordinal: u32,
}

impl<'a> StateMachineShapeBuilder<'a> {
    /// `ordinal` distinguishes machines generated for the same containing
    /// type.
    pub const fn new(method: &'a IteratorMethod, options: &'a LoweringOptions, ordinal: u32) -> Self {
        Self {
            method,
            options,
            ordinal,
        }
    }

    pub fn build(self) -> Result<IteratorStateMachine, LoweringError> {
        let method = self.method;
        let analysis = YieldsInTryAnalysis::analyze(&method.body, &method.labels)?;
        analysis.check_name_tables(method.labels.len(), method.locals.len())?;
        let mut factory = BoundFactory::for_method(method);

        let name = format!("<{}>d__{}", method.name, self.ordinal);
        let enumerator_type = format!("IEnumerator<{}>", method.element_type);

        let fields = StateFields {
            state: factory.add_field("state", "int"),
            current: factory.add_field("current", &method.element_type),
        };
        let initial_thread_id = (self.options.track_initial_thread
            && method.kind == IteratorKind::Enumerable)
            .then(|| factory.add_field("initialThreadId", "int"));

        let members = MachineMembers {
            kick_off: factory.open_method(
                method.name.clone(),
                MethodKind::KickOff,
                &method.return_type(),
                &[],
            ),
            constructor: factory.open_method(name.clone(), MethodKind::Constructor, "", &["state"]),
            move_next: factory.open_method("MoveNext", MethodKind::MoveNext, "bool", &[]),
            dispose: factory.open_method("Dispose", MethodKind::Dispose, "void", &[]),
            current_getter: factory.open_method(
                "get_Current",
                MethodKind::CurrentGetter,
                &method.element_type,
                &[],
            ),
            reset: factory.open_method("Reset", MethodKind::Reset, "void", &[]),
            get_enumerator: (method.kind == IteratorKind::Enumerable).then(|| {
                factory.open_method(
                    "GetEnumerator",
                    MethodKind::GetEnumerator,
                    &enumerator_type,
                    &[],
                )
            }),
        };

        factory.set_current_method(Some(members.move_next));
        let rewritten = IteratorBodyRewriter::new(
            &mut factory,
            &analysis,
            StateDispatcher::new(&self.options.previous_states),
            fields,
            members.dispose,
        )
        .rewrite(&method.body)?;
        factory.close_method(members.move_next, rewritten.move_next_body);
        factory.set_current_method(Some(members.dispose));
        factory.close_method(members.dispose, rewritten.dispose_body);

        factory.set_current_method(Some(members.constructor));
        let mut constructor = vec![BoundStatement::assign_field(
            fields.state,
            BoundExpr::Parameter(0),
        )];
        if let Some(thread_field) = initial_thread_id {
            constructor.push(BoundStatement::assign_field(
                thread_field,
                BoundExpr::host_call(CURRENT_THREAD_ID, Vec::new()),
            ));
        }
        factory.close_method(members.constructor, BoundStatement::block(constructor));

        factory.close_method(
            members.current_getter,
            BoundStatement::block(vec![BoundStatement::ret(Some(BoundExpr::this_field(
                fields.current,
            )))]),
        );
        factory.close_method(
            members.reset,
            BoundStatement::block(vec![BoundStatement::Throw(BoundExpr::new_object(
                NOT_SUPPORTED_EXCEPTION,
                Vec::new(),
            ))]),
        );

        if let Some(get_enumerator) = members.get_enumerator {
            factory.set_current_method(Some(get_enumerator));
            let body = get_enumerator_body(&mut factory, &name, fields.state, initial_thread_id);
            factory.close_method(get_enumerator, body);
        }

        let initial_state = match method.kind {
            IteratorKind::Enumerable => INITIAL_ENUMERABLE,
            IteratorKind::Enumerator => INITIAL,
        };
        factory.close_method(
            members.kick_off,
            BoundStatement::block(vec![BoundStatement::ret(Some(BoundExpr::new_object(
                name.clone(),
                vec![BoundExpr::int(i64::from(initial_state))],
            )))]),
        );
        factory.set_current_method(None);

        Ok(IteratorStateMachine {
            name,
            method_name: method.name.clone(),
            kind: method.kind,
            element_type: method.element_type.clone(),
            state_field: fields.state,
            current_field: fields.current,
            initial_thread_id_field: initial_thread_id,
            members,
            finally_methods: rewritten.finally_methods,
            resumable_states: rewritten.resumable_states,
            finalize_states: rewritten.finalize_states,
            state_map: rewritten.state_map,
            tables: factory.finish(),
        })
    }
}

/// The first `GetEnumerator` on the creating thread reuses the kick-off
/// instance; every other call gets a fresh machine.
fn get_enumerator_body(
    factory: &mut BoundFactory,
    machine_name: &str,
    state: FieldId,
    initial_thread_id: Option<FieldId>,
) -> BoundStatement {
    let result = factory.synthesized_local("result");

    let mut condition = BoundExpr::binary(
        BoundExpr::this_field(state),
        BinaryOp::Eq,
        BoundExpr::int(i64::from(FINISHED)),
    );
    if let Some(thread_field) = initial_thread_id {
        condition = BoundExpr::binary(
            condition,
            BinaryOp::And,
            BoundExpr::binary(
                BoundExpr::this_field(thread_field),
                BinaryOp::Eq,
                BoundExpr::host_call(CURRENT_THREAD_ID, Vec::new()),
            ),
        );
    }

    BoundStatement::block(vec![
        BoundStatement::if_then(
            condition,
            BoundStatement::block(vec![
                BoundStatement::assign_field(state, BoundExpr::int(i64::from(INITIAL))),
                BoundStatement::assign(BoundExpr::local(result), BoundExpr::This),
            ]),
            Some(BoundStatement::block(vec![BoundStatement::assign(
                BoundExpr::local(result),
                BoundExpr::new_object(machine_name, vec![BoundExpr::int(i64::from(INITIAL))]),
            )])),
        ),
        BoundStatement::ret(Some(BoundExpr::local(result))),
    ])
}

#[cfg(test)]
#[path = "../tests/shape_tests.rs"]
mod tests;
