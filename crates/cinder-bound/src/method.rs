//! Iterator methods: the unit of input to lowering.

use crate::tree::BoundStatement;
use serde::{Deserialize, Serialize};

/// Which protocol the iterator's declared return type names.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IteratorKind {
    /// `IEnumerable<T>`: the state machine also implements `GetEnumerator`.
    Enumerable,
    /// `IEnumerator<T>`
    Enumerator,
}

/// A method whose body contains `yield return` / `yield break`.
///
/// `labels[i]` and `locals[i]` are the names of `LabelId(i)` and
/// `LocalId(i)` as used in `body`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IteratorMethod {
    pub name: String,
    pub element_type: String,
    pub kind: IteratorKind,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub locals: Vec<String>,
    pub body: BoundStatement,
}

impl IteratorMethod {
    pub fn new(
        name: impl Into<String>,
        element_type: impl Into<String>,
        kind: IteratorKind,
        body: BoundStatement,
    ) -> Self {
        Self {
            name: name.into(),
            element_type: element_type.into(),
            kind,
            labels: Vec::new(),
            locals: Vec::new(),
            body,
        }
    }

    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| (*l).to_string()).collect();
        self
    }

    pub fn with_locals(mut self, locals: &[&str]) -> Self {
        self.locals = locals.iter().map(|l| (*l).to_string()).collect();
        self
    }

    /// Declared return type, e.g. `IEnumerable<int>`.
    pub fn return_type(&self) -> String {
        match self.kind {
            IteratorKind::Enumerable => format!("IEnumerable<{}>", self.element_type),
            IteratorKind::Enumerator => format!("IEnumerator<{}>", self.element_type),
        }
    }
}
