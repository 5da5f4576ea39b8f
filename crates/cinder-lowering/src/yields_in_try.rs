//! Pre-pass: which try statements contain `yield return`?
//!
//! Try statements are identified by their *ordinal*: the position of the
//! statement in a pre-order walk visiting the try block, then the catch
//! blocks, then the finally block. The rewriter walks in the same order, so
//! both sides agree on ordinals without the tree carrying ids.
//!
//! For every yielding try the analysis records all labels declared anywhere
//! inside it, including inside nested trys. A `goto` from inside the try to
//! one of these labels does not leave the try; any other target does, and
//! the rewriter must route it through the try's finally handler.
//!
//! The walk also verifies the preconditions lowering depends on:
//! - `yield return` only inside try blocks without catch clauses, never in a
//!   catch or finally block
//! - no `yield break`/`return` inside a finally block, and no `return` with
//!   a value
//! - every `goto` target is declared
//! - no conditional `goto` leaves a yielding try (such a branch cannot be
//!   proxied through the finally handler)
//!
//! It also records the highest label and local ids the body uses, so the
//! caller can reject name tables that do not cover them. Synthesized ids are
//! allocated past the end of those tables.

use crate::error::LoweringError;
use cinder_bound::{BoundCatchBlock, BoundExpr, BoundStatement, LabelId, LocalId};
use cinder_common::limits::MAX_REWRITE_DEPTH;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::debug;

pub type TryOrdinal = u32;

#[derive(Clone, Debug, Default)]
pub struct YieldsInTryAnalysis {
    yielding_trys: FxHashMap<TryOrdinal, FxHashSet<LabelId>>,
    try_count: u32,
    max_label: Option<LabelId>,
    max_local: Option<LocalId>,
}

impl YieldsInTryAnalysis {
    /// Analyze a method body. `label_names` is only used for error messages.
    pub fn analyze(body: &BoundStatement, label_names: &[String]) -> Result<Self, LoweringError> {
        let mut walker = Walker::default();
        walker.visit(body)?;
        walker.check_gotos(label_names)?;

        debug!(
            try_count = walker.next_ordinal,
            yielding = walker.yielding.len(),
            "yields-in-try analysis"
        );
        Ok(Self {
            yielding_trys: walker.yielding,
            try_count: walker.next_ordinal,
            max_label: walker.max_label,
            max_local: walker.max_local,
        })
    }

    /// Fails unless the method's label and local tables name every id the
    /// body uses.
    pub fn check_name_tables(
        &self,
        label_count: usize,
        local_count: usize,
    ) -> Result<(), LoweringError> {
        if let Some(label) = self.max_label
            && label.index() >= label_count
        {
            return Err(LoweringError::NameTableTooShort {
                kind: "label",
                id: label.0,
                declared: label_count,
            });
        }
        if let Some(local) = self.max_local
            && local.index() >= local_count
        {
            return Err(LoweringError::NameTableTooShort {
                kind: "local",
                id: local.0,
                declared: local_count,
            });
        }
        Ok(())
    }

    /// Highest label id used by the body.
    pub const fn max_label(&self) -> Option<LabelId> {
        self.max_label
    }

    /// Highest local id used by the body.
    pub const fn max_local(&self) -> Option<LocalId> {
        self.max_local
    }

    /// Does the try statement with this ordinal contain a `yield return`?
    pub fn contains_yields(&self, ordinal: TryOrdinal) -> bool {
        self.yielding_trys.contains_key(&ordinal)
    }

    /// Labels declared inside a yielding try. `None` for non-yielding trys.
    pub fn labels(&self, ordinal: TryOrdinal) -> Option<&FxHashSet<LabelId>> {
        self.yielding_trys.get(&ordinal)
    }

    pub fn contains_yields_in_trys(&self) -> bool {
        !self.yielding_trys.is_empty()
    }

    pub const fn try_count(&self) -> u32 {
        self.try_count
    }
}

#[derive(Default)]
struct Walker {
    seen_yield: bool,
    labels: FxHashSet<LabelId>,
    next_ordinal: TryOrdinal,
    /// Trys whose try block encloses the current statement, outermost first.
    enclosing_trys: SmallVec<[TryOrdinal; 4]>,
    /// Innermost handler clause enclosing the current statement.
    handler: Option<&'static str>,
    yielding: FxHashMap<TryOrdinal, FxHashSet<LabelId>>,
    all_labels: FxHashSet<LabelId>,
    gotos: Vec<LabelId>,
    conditional_gotos: Vec<(LabelId, SmallVec<[TryOrdinal; 4]>)>,
    max_label: Option<LabelId>,
    max_local: Option<LocalId>,
    depth: u32,
}

impl Walker {
    fn visit(&mut self, statement: &BoundStatement) -> Result<(), LoweringError> {
        if self.depth >= MAX_REWRITE_DEPTH {
            return Err(LoweringError::NestingTooDeep {
                limit: MAX_REWRITE_DEPTH,
            });
        }
        self.depth += 1;
        let result = self.visit_inner(statement);
        self.depth -= 1;
        result
    }

    fn visit_inner(&mut self, statement: &BoundStatement) -> Result<(), LoweringError> {
        match statement {
            BoundStatement::Block(statements) => {
                for s in statements {
                    self.visit(s)?;
                }
            }
            BoundStatement::Label(label) => {
                self.note_label(*label);
                self.labels.insert(*label);
                self.all_labels.insert(*label);
            }
            BoundStatement::Goto(label) => {
                self.note_label(*label);
                self.gotos.push(*label);
            }
            BoundStatement::ConditionalGoto {
                condition, label, ..
            } => {
                self.note_expr(condition);
                self.note_label(*label);
                self.gotos.push(*label);
                self.conditional_gotos
                    .push((*label, self.enclosing_trys.clone()));
            }
            BoundStatement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.note_expr(condition);
                self.visit(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.visit(else_branch)?;
                }
            }
            BoundStatement::Switch {
                expression,
                sections,
            } => {
                self.note_expr(expression);
                for section in sections {
                    for s in &section.body {
                        self.visit(s)?;
                    }
                }
            }
            BoundStatement::Try {
                try_block,
                catch_blocks,
                finally_block,
                ..
            } => self.visit_try(try_block, catch_blocks, finally_block.as_deref())?,
            BoundStatement::YieldReturn { expr, .. } => {
                if let Some(clause) = self.handler {
                    return Err(LoweringError::YieldInHandler { clause });
                }
                self.note_expr(expr);
                self.seen_yield = true;
            }
            BoundStatement::YieldBreak | BoundStatement::Return(None) => {
                if self.handler == Some("finally") {
                    return Err(LoweringError::ExitFromFinally);
                }
            }
            BoundStatement::Return(Some(_)) => return Err(LoweringError::ReturnWithValue),
            BoundStatement::Expression(expr) | BoundStatement::Throw(expr) => self.note_expr(expr),
        }
        Ok(())
    }

    fn note_label(&mut self, label: LabelId) {
        self.max_label = self.max_label.max(Some(label));
    }

    fn note_local(&mut self, local: LocalId) {
        self.max_local = self.max_local.max(Some(local));
    }

    fn note_expr(&mut self, expr: &BoundExpr) {
        match expr {
            BoundExpr::Local(local) => self.note_local(*local),
            BoundExpr::Field { receiver, .. } | BoundExpr::Not(receiver) => {
                self.note_expr(receiver);
            }
            BoundExpr::Assign {
                target: left,
                value: right,
            }
            | BoundExpr::Binary { left, right, .. } => {
                self.note_expr(left);
                self.note_expr(right);
            }
            BoundExpr::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    self.note_expr(receiver);
                }
                for arg in args {
                    self.note_expr(arg);
                }
            }
            BoundExpr::New { args, .. } => {
                for arg in args {
                    self.note_expr(arg);
                }
            }
            BoundExpr::Literal(_) | BoundExpr::Parameter(_) | BoundExpr::This => {}
        }
    }

    fn visit_try(
        &mut self,
        try_block: &BoundStatement,
        catch_blocks: &[BoundCatchBlock],
        finally_block: Option<&BoundStatement>,
    ) -> Result<(), LoweringError> {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;

        // sibling trys do not see each other's yields or labels
        let outer_seen_yield = std::mem::take(&mut self.seen_yield);
        let outer_labels = std::mem::take(&mut self.labels);

        self.enclosing_trys.push(ordinal);
        let result = self.visit(try_block);
        self.enclosing_trys.pop();
        result?;

        let outer_handler = self.handler;
        self.handler = Some("catch");
        for catch in catch_blocks {
            if let Some(local) = catch.local {
                self.note_local(local);
            }
            self.visit(&catch.body)?;
        }
        if let Some(finally_block) = finally_block {
            self.handler = Some("finally");
            self.visit(finally_block)?;
        }
        self.handler = outer_handler;

        if self.seen_yield {
            if !catch_blocks.is_empty() {
                return Err(LoweringError::YieldInTryWithCatch);
            }
            self.yielding.insert(ordinal, self.labels.clone());
        }

        self.seen_yield |= outer_seen_yield;
        let inner_labels = std::mem::replace(&mut self.labels, outer_labels);
        self.labels.extend(inner_labels);
        Ok(())
    }

    fn check_gotos(&self, label_names: &[String]) -> Result<(), LoweringError> {
        if let Some(label) = self.gotos.iter().find(|l| !self.all_labels.contains(*l)) {
            return Err(LoweringError::UnknownLabel { label: label.0 });
        }
        for (label, enclosing) in &self.conditional_gotos {
            let leaves_yielding_try = enclosing.iter().any(|ordinal| {
                self.yielding
                    .get(ordinal)
                    .is_some_and(|labels| !labels.contains(label))
            });
            if leaves_yielding_try {
                let label = label_names
                    .get(label.index())
                    .cloned()
                    .unwrap_or_else(|| format!("#{}", label.0));
                return Err(LoweringError::ConditionalGotoLeavesFinallyFrame { label });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/yields_in_try_tests.rs"]
mod tests;
