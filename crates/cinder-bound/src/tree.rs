//! Bound statement and expression tree.
//!
//! This is the input and output language of iterator lowering. The input is
//! a method body after local rewriting: structured loops are already gone,
//! so control flow is expressed with labels, `goto` and conditional `goto`,
//! plus `try` statements and `yield` statements. The output of lowering uses
//! the same tree minus the `yield` statements.
//!
//! # Structure
//!
//! Statements own their children (`Box`/`Vec`); rewriting builds a new tree
//! rather than mutating in place. Labels, locals, fields and methods are
//! referenced by id; their names live in the `BoundTables` of the method
//! being lowered.

use crate::ids::{FieldId, LabelId, LocalId, MethodId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Statements
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundStatement {
    /// `{ statements }`
    Block(Vec<BoundStatement>),

    /// `expr;`
    Expression(BoundExpr),

    /// `label:`
    Label(LabelId),

    /// `goto label;`
    Goto(LabelId),

    /// `if (condition == jump_if_true) goto label;`
    ConditionalGoto {
        condition: BoundExpr,
        jump_if_true: bool,
        label: LabelId,
    },

    /// `if (condition) then else otherwise`
    If {
        condition: BoundExpr,
        then_branch: Box<BoundStatement>,
        #[serde(default)]
        else_branch: Option<Box<BoundStatement>>,
    },

    /// `switch (expression) { case v1: case v2: body ... }`
    ///
    /// Sections do not fall through; control continues after the switch when
    /// a section body completes or no section matches.
    Switch {
        expression: BoundExpr,
        sections: Vec<BoundSwitchSection>,
    },

    /// `try { } catch { } finally { }`
    ///
    /// With `prefer_fault_handler` the finally block is a fault handler: it
    /// only runs when an exception propagates out of the try block.
    Try {
        try_block: Box<BoundStatement>,
        #[serde(default)]
        catch_blocks: Vec<BoundCatchBlock>,
        #[serde(default)]
        finally_block: Option<Box<BoundStatement>>,
        #[serde(default)]
        prefer_fault_handler: bool,
        /// Position of the statement in the original source, used to keep
        /// finalize states stable across edits.
        #[serde(default)]
        syntax_offset: Option<u32>,
    },

    /// `yield return expr;`
    YieldReturn {
        expr: BoundExpr,
        #[serde(default)]
        syntax_offset: Option<u32>,
    },

    /// `yield break;`
    YieldBreak,

    /// `return;` / `return expr;`
    Return(Option<BoundExpr>),

    /// `throw expr;`
    Throw(BoundExpr),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundSwitchSection {
    pub values: Vec<i64>,
    pub body: Vec<BoundStatement>,
}

/// A catch-all clause. `local`, when present, receives the thrown value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundCatchBlock {
    #[serde(default)]
    pub local: Option<LocalId>,
    pub body: BoundStatement,
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundExpr {
    Literal(Literal),
    Local(LocalId),
    /// Positional parameter of the enclosing synthesized method.
    Parameter(u32),
    This,
    Field {
        receiver: Box<BoundExpr>,
        field: FieldId,
    },
    Assign {
        target: Box<BoundExpr>,
        value: Box<BoundExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    Not(Box<BoundExpr>),
    Call {
        #[serde(default)]
        receiver: Option<Box<BoundExpr>>,
        callee: Callee,
        #[serde(default)]
        args: Vec<BoundExpr>,
    },
    /// `new TypeName(args)`
    New {
        type_name: String,
        #[serde(default)]
        args: Vec<BoundExpr>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Target of a call.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Callee {
    /// A method synthesized during lowering.
    Synthesized(MethodId),
    /// Anything defined outside the method being lowered, by display name.
    Host(String),
}

// =============================================================================
// Builder helpers
// =============================================================================

impl BoundExpr {
    pub const fn int(value: i64) -> Self {
        Self::Literal(Literal::Int(value))
    }

    pub const fn bool(value: bool) -> Self {
        Self::Literal(Literal::Bool(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::Str(value.into()))
    }

    pub const fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    pub const fn local(local: LocalId) -> Self {
        Self::Local(local)
    }

    /// `this.field`
    pub fn this_field(field: FieldId) -> Self {
        Self::Field {
            receiver: Box::new(Self::This),
            field,
        }
    }

    pub fn assign(target: Self, value: Self) -> Self {
        Self::Assign {
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    pub fn binary(left: Self, op: BinaryOp, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(operand: Self) -> Self {
        Self::Not(Box::new(operand))
    }

    /// `this.Method()` for a synthesized method.
    pub fn call_this(method: MethodId) -> Self {
        Self::Call {
            receiver: Some(Box::new(Self::This)),
            callee: Callee::Synthesized(method),
            args: Vec::new(),
        }
    }

    /// Call to something outside the lowered method.
    pub fn host_call(name: impl Into<String>, args: Vec<Self>) -> Self {
        Self::Call {
            receiver: None,
            callee: Callee::Host(name.into()),
            args,
        }
    }

    pub fn new_object(type_name: impl Into<String>, args: Vec<Self>) -> Self {
        Self::New {
            type_name: type_name.into(),
            args,
        }
    }
}

impl BoundStatement {
    pub const fn block(statements: Vec<Self>) -> Self {
        Self::Block(statements)
    }

    pub const fn empty() -> Self {
        Self::Block(Vec::new())
    }

    pub const fn expr(expr: BoundExpr) -> Self {
        Self::Expression(expr)
    }

    /// `target = value;`
    pub fn assign(target: BoundExpr, value: BoundExpr) -> Self {
        Self::Expression(BoundExpr::assign(target, value))
    }

    /// `this.field = value;`
    pub fn assign_field(field: FieldId, value: BoundExpr) -> Self {
        Self::assign(BoundExpr::this_field(field), value)
    }

    pub const fn ret(expr: Option<BoundExpr>) -> Self {
        Self::Return(expr)
    }

    pub const fn goto(label: LabelId) -> Self {
        Self::Goto(label)
    }

    pub const fn label(label: LabelId) -> Self {
        Self::Label(label)
    }

    pub fn if_then(condition: BoundExpr, then_branch: Self, else_branch: Option<Self>) -> Self {
        Self::If {
            condition,
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        }
    }

    /// `try { try_block } finally { finally_block }`
    pub fn try_finally(try_block: Self, finally_block: Self) -> Self {
        Self::Try {
            try_block: Box::new(try_block),
            catch_blocks: Vec::new(),
            finally_block: Some(Box::new(finally_block)),
            prefer_fault_handler: false,
            syntax_offset: None,
        }
    }

    /// `try { try_block } fault { handler }`
    pub fn try_fault(try_block: Self, handler: Self) -> Self {
        Self::Try {
            try_block: Box::new(try_block),
            catch_blocks: Vec::new(),
            finally_block: Some(Box::new(handler)),
            prefer_fault_handler: true,
            syntax_offset: None,
        }
    }

    pub fn yield_return(expr: BoundExpr) -> Self {
        Self::YieldReturn {
            expr,
            syntax_offset: None,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Does this statement declare `label` anywhere a `goto` from outside
    /// could land? Catch and finally blocks are not entry points.
    pub fn declares_entry_label(&self, label: LabelId) -> bool {
        match self {
            Self::Label(l) => *l == label,
            Self::Block(statements) => statements.iter().any(|s| s.declares_entry_label(label)),
            Self::If {
                then_branch,
                else_branch,
                ..
            } => {
                then_branch.declares_entry_label(label)
                    || else_branch
                        .as_ref()
                        .is_some_and(|e| e.declares_entry_label(label))
            }
            Self::Switch { sections, .. } => sections
                .iter()
                .any(|section| section.body.iter().any(|s| s.declares_entry_label(label))),
            Self::Try { try_block, .. } => try_block.declares_entry_label(label),
            Self::Expression(_)
            | Self::Goto(_)
            | Self::ConditionalGoto { .. }
            | Self::YieldReturn { .. }
            | Self::YieldBreak
            | Self::Return(_)
            | Self::Throw(_) => false,
        }
    }

    /// Does this statement (transitively) contain a `yield return` or
    /// `yield break`?
    pub fn contains_yield(&self) -> bool {
        match self {
            Self::YieldReturn { .. } | Self::YieldBreak => true,
            Self::Block(statements) => statements.iter().any(Self::contains_yield),
            Self::If {
                then_branch,
                else_branch,
                ..
            } => then_branch.contains_yield() || else_branch.as_ref().is_some_and(|e| e.contains_yield()),
            Self::Switch { sections, .. } => sections
                .iter()
                .any(|section| section.body.iter().any(Self::contains_yield)),
            Self::Try {
                try_block,
                catch_blocks,
                finally_block,
                ..
            } => {
                try_block.contains_yield()
                    || catch_blocks.iter().any(|c| c.body.contains_yield())
                    || finally_block.as_ref().is_some_and(|f| f.contains_yield())
            }
            Self::Expression(_)
            | Self::Label(_)
            | Self::Goto(_)
            | Self::ConditionalGoto { .. }
            | Self::Return(_)
            | Self::Throw(_) => false,
        }
    }
}

#[cfg(test)]
#[path = "../tests/tree_tests.rs"]
mod tests;
