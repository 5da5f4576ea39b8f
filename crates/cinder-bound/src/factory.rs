//! Synthesis of labels, locals, fields and methods.
//!
//! A `BoundFactory` owns the name tables of one method being lowered. It
//! starts out seeded with the source method's labels and locals, so ids in
//! the input body stay valid, and hands out fresh ids for everything the
//! lowering synthesizes.
//!
//! The factory also tracks the *current function*: statements produced while
//! rewriting a finally block belong to the synthesized finally helper rather
//! than to `MoveNext`.

use crate::ids::{FieldId, LabelId, LocalId, MethodId};
use crate::method::IteratorMethod;
use crate::tree::BoundStatement;
use serde::{Deserialize, Serialize};

/// Role of a synthesized method in the state machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    /// Replacement body of the original iterator method.
    KickOff,
    Constructor,
    MoveNext,
    Dispose,
    /// Helper running one try statement's finally block.
    Finally,
    CurrentGetter,
    Reset,
    GetEnumerator,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedMethod {
    pub name: String,
    pub kind: MethodKind,
    pub return_type: String,
    pub parameters: Vec<String>,
    pub is_static: bool,
    /// `None` until the method is closed.
    pub body: Option<BoundStatement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub type_name: String,
}

/// Name tables shared by a lowered method and everything synthesized for it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundTables {
    pub labels: Vec<String>,
    pub locals: Vec<String>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<SynthesizedMethod>,
}

impl BoundTables {
    pub fn label_name(&self, label: LabelId) -> &str {
        self.labels.get(label.index()).map_or("<label?>", String::as_str)
    }

    pub fn local_name(&self, local: LocalId) -> &str {
        self.locals.get(local.index()).map_or("<local?>", String::as_str)
    }

    pub fn field_name(&self, field: FieldId) -> &str {
        self.fields
            .get(field.index())
            .map_or("<field?>", |f| f.name.as_str())
    }

    pub fn method(&self, method: MethodId) -> Option<&SynthesizedMethod> {
        self.methods.get(method.index())
    }

    pub fn method_name(&self, method: MethodId) -> &str {
        self.method(method).map_or("<method?>", |m| m.name.as_str())
    }

    /// Methods of the given kind, in creation order.
    pub fn methods_of_kind(&self, kind: MethodKind) -> impl Iterator<Item = MethodId> + '_ {
        self.methods
            .iter()
            .enumerate()
            .filter(move |(_, m)| m.kind == kind)
            .map(|(i, _)| MethodId(i as u32))
    }
}

#[derive(Clone, Debug, Default)]
pub struct BoundFactory {
    tables: BoundTables,
    current_method: Option<MethodId>,
}

impl BoundFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose label and local tables start with the method's own.
    pub fn for_method(method: &IteratorMethod) -> Self {
        Self {
            tables: BoundTables {
                labels: method.labels.clone(),
                locals: method.locals.clone(),
                fields: Vec::new(),
                methods: Vec::new(),
            },
            current_method: None,
        }
    }

    // =========================================================================
    // Synthesis
    // =========================================================================

    /// A fresh label named `{hint}_{id}`.
    pub fn generate_label(&mut self, hint: &str) -> LabelId {
        let id = LabelId(self.tables.labels.len() as u32);
        self.tables.labels.push(format!("{hint}_{}", id.0));
        id
    }

    pub fn synthesized_local(&mut self, name: &str) -> LocalId {
        let id = LocalId(self.tables.locals.len() as u32);
        self.tables.locals.push(name.to_string());
        id
    }

    pub fn add_field(&mut self, name: &str, type_name: &str) -> FieldId {
        let id = FieldId(self.tables.fields.len() as u32);
        self.tables.fields.push(FieldDef {
            name: name.to_string(),
            type_name: type_name.to_string(),
        });
        id
    }

    /// Declare a method. Its body is supplied later by `close_method`.
    pub fn open_method(
        &mut self,
        name: impl Into<String>,
        kind: MethodKind,
        return_type: &str,
        parameters: &[&str],
    ) -> MethodId {
        let id = MethodId(self.tables.methods.len() as u32);
        self.tables.methods.push(SynthesizedMethod {
            name: name.into(),
            kind,
            return_type: return_type.to_string(),
            parameters: parameters.iter().map(|p| (*p).to_string()).collect(),
            is_static: kind == MethodKind::KickOff,
            body: None,
        });
        id
    }

    pub fn close_method(&mut self, method: MethodId, body: BoundStatement) {
        if let Some(m) = self.tables.methods.get_mut(method.index()) {
            m.body = Some(body);
        }
    }

    // =========================================================================
    // Current function
    // =========================================================================

    pub const fn current_method(&self) -> Option<MethodId> {
        self.current_method
    }

    /// Switch the current function, returning the previous one.
    pub const fn set_current_method(&mut self, method: Option<MethodId>) -> Option<MethodId> {
        let previous = self.current_method;
        self.current_method = method;
        previous
    }

    pub fn current_method_kind(&self) -> Option<MethodKind> {
        self.current_method
            .and_then(|m| self.tables.method(m))
            .map(|m| m.kind)
    }

    // =========================================================================
    // Access
    // =========================================================================

    pub const fn tables(&self) -> &BoundTables {
        &self.tables
    }

    pub fn label_name(&self, label: LabelId) -> &str {
        self.tables.label_name(label)
    }

    pub fn finish(self) -> BoundTables {
        self.tables
    }
}

#[cfg(test)]
#[path = "../tests/factory_tests.rs"]
mod tests;
