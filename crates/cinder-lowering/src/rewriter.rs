//! The iterator body rewriter.
//!
//! Turns the body of an iterator method into the body of `MoveNext` and
//! produces the matching `Dispose`. The rewrite is a single recursive walk
//! carrying three pieces of ambient state:
//!
//! - the current finally frame (the innermost try-with-yield being rewritten)
//! - the try nesting level, which decides whether a return can be a plain
//!   `return` or has to go through the shared exit label
//! - the current function (`MoveNext`, or a finally helper while a finally
//!   block is being rewritten), tracked by the `BoundFactory`
//!
//! ## Shapes
//!
//! `yield return e;` becomes
//!
//! ```text
//! this.current = e;
//! this.state = <n>;
//! return true;            // or: methodValue = true; goto exitLabel;
//! resume_<n>:
//! this.state = <frame finalize state>;
//! ```
//!
//! A try statement containing a yield becomes
//!
//! ```text
//! this.state = <finalize>;
//! <try block>
//! this.<>m__FinallyN();
//! goto dropThrough;       // only when a goto left the try block
//! proxy_L:
//! this.<>m__FinallyN();
//! goto <parent's proxy for L>;
//! dropThrough:
//! ```
//!
//! and its finally block moves into `<>m__FinallyN`, which first resets the
//! state to the parent frame's finalize state.

use crate::dispatcher::{StateDispatcher, StateMapEntry};
use crate::error::LoweringError;
use crate::finally_frame::{FinallyFrameTree, FrameId};
use crate::state::{FINISHED, INITIAL, NOT_STARTED_OR_RUNNING, StateNumber};
use crate::yields_in_try::{TryOrdinal, YieldsInTryAnalysis};
use cinder_bound::{
    BoundCatchBlock, BoundExpr, BoundFactory, BoundStatement, BoundSwitchSection, FieldId,
    LabelId, LocalId, MethodId, MethodKind,
};
use cinder_common::limits::MAX_REWRITE_DEPTH;
use tracing::{debug, trace};

/// The state machine fields the rewritten code reads and writes.
#[derive(Copy, Clone, Debug)]
pub struct StateFields {
    pub state: FieldId,
    pub current: FieldId,
}

/// Output of a rewrite.
#[derive(Clone, Debug)]
pub struct RewrittenIterator {
    pub move_next_body: BoundStatement,
    pub dispose_body: BoundStatement,
    /// Finally helpers, in the order their try statements were entered.
    pub finally_methods: Vec<MethodId>,
    /// Yield states, in allocation order.
    pub resumable_states: Vec<StateNumber>,
    /// Finalize states of try-with-yield frames, in allocation order.
    pub finalize_states: Vec<StateNumber>,
    pub state_map: Vec<StateMapEntry>,
}

pub struct IteratorBodyRewriter<'a> {
    factory: &'a mut BoundFactory,
    analysis: &'a YieldsInTryAnalysis,
    dispatcher: StateDispatcher,
    frames: FinallyFrameTree,
    current_frame: FrameId,
    try_nesting_level: u32,
    next_try_ordinal: TryOrdinal,
    fields: StateFields,
    dispose_method: MethodId,
    exit_label: Option<LabelId>,
    method_value: Option<LocalId>,
    finally_methods: Vec<MethodId>,
    finalize_states: Vec<StateNumber>,
    depth: u32,
}

impl<'a> IteratorBodyRewriter<'a> {
    pub fn new(
        factory: &'a mut BoundFactory,
        analysis: &'a YieldsInTryAnalysis,
        dispatcher: StateDispatcher,
        fields: StateFields,
        dispose_method: MethodId,
    ) -> Self {
        Self {
            factory,
            analysis,
            dispatcher,
            frames: FinallyFrameTree::new(),
            current_frame: FrameId::ROOT,
            try_nesting_level: 0,
            next_try_ordinal: 0,
            fields,
            dispose_method,
            exit_label: None,
            method_value: None,
            finally_methods: Vec::new(),
            finalize_states: Vec::new(),
            depth: 0,
        }
    }

    /// Rewrite `body` into `MoveNext` and build `Dispose`.
    ///
    /// The factory's current function must be `MoveNext`.
    pub fn rewrite(mut self, body: &BoundStatement) -> Result<RewrittenIterator, LoweringError> {
        // the whole body is wrapped in a try/fault below
        let yields_in_trys = self.analysis.contains_yields_in_trys();
        if yields_in_trys {
            self.try_nesting_level += 1;
        }

        let initial_label = self.factory.generate_label("initial");
        self.dispatcher.add_dispatch(INITIAL, initial_label);
        let cached_state = self.factory.synthesized_local("cachedState");

        let rewritten = self.visit(body)?;

        let mut move_next = BoundStatement::block(vec![
            BoundStatement::assign(
                BoundExpr::local(cached_state),
                BoundExpr::this_field(self.fields.state),
            ),
            self.dispatcher.dispatch(BoundExpr::local(cached_state)),
            self.generate_return(true),
            BoundStatement::label(initial_label),
            BoundStatement::assign_field(
                self.fields.state,
                BoundExpr::int(i64::from(NOT_STARTED_OR_RUNNING)),
            ),
            rewritten,
            self.generate_return(true),
        ]);

        if yields_in_trys {
            // an exception escaping MoveNext runs the pending finally blocks
            move_next = BoundStatement::try_fault(
                move_next,
                BoundStatement::block(vec![BoundStatement::expr(BoundExpr::call_this(
                    self.dispose_method,
                ))]),
            );
            self.try_nesting_level -= 1;
        }

        if let (Some(exit_label), Some(method_value)) = (self.exit_label, self.method_value) {
            move_next = BoundStatement::block(vec![
                move_next,
                BoundStatement::label(exit_label),
                BoundStatement::ret(Some(BoundExpr::local(method_value))),
            ]);
        }

        let dispose_body = self.dispose_body()?;
        let resumable_states = self
            .dispatcher
            .dispatches()
            .map(|(state, _)| state)
            .filter(|&state| state != INITIAL)
            .collect();

        debug!(
            frames = self.frames.len() - 1,
            exit_label = self.exit_label.is_some(),
            "rewrote iterator body"
        );
        Ok(RewrittenIterator {
            move_next_body: move_next,
            dispose_body,
            finally_methods: self.finally_methods,
            resumable_states,
            finalize_states: self.finalize_states,
            state_map: self.dispatcher.into_state_map(),
        })
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn visit(&mut self, statement: &BoundStatement) -> Result<BoundStatement, LoweringError> {
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

    fn visit_inner(&mut self, statement: &BoundStatement) -> Result<BoundStatement, LoweringError> {
        match statement {
            BoundStatement::Block(statements) => Ok(BoundStatement::Block(self.visit_list(statements)?)),
            BoundStatement::Expression(_)
            | BoundStatement::Label(_)
            | BoundStatement::Throw(_) => Ok(statement.clone()),
            BoundStatement::Goto(label) => {
                let target =
                    self.frames
                        .proxy_label_if_needed(self.current_frame, *label, self.factory);
                Ok(BoundStatement::Goto(target))
            }
            BoundStatement::ConditionalGoto { label, .. } => {
                if self.frames.requires_proxy(self.current_frame, *label) {
                    return Err(LoweringError::ConditionalGotoLeavesFinallyFrame {
                        label: self.factory.label_name(*label).to_string(),
                    });
                }
                Ok(statement.clone())
            }
            BoundStatement::If {
                condition,
                then_branch,
                else_branch,
            } => Ok(BoundStatement::If {
                condition: condition.clone(),
                then_branch: Box::new(self.visit(then_branch)?),
                else_branch: match else_branch {
                    Some(else_branch) => Some(Box::new(self.visit(else_branch)?)),
                    None => None,
                },
            }),
            BoundStatement::Switch {
                expression,
                sections,
            } => {
                let mut rewritten = Vec::with_capacity(sections.len());
                for section in sections {
                    rewritten.push(BoundSwitchSection {
                        values: section.values.clone(),
                        body: self.visit_list(&section.body)?,
                    });
                }
                Ok(BoundStatement::Switch {
                    expression: expression.clone(),
                    sections: rewritten,
                })
            }
            BoundStatement::Try {
                try_block,
                catch_blocks,
                finally_block,
                prefer_fault_handler,
                syntax_offset,
            } => self.visit_try(
                try_block,
                catch_blocks,
                finally_block.as_deref(),
                *prefer_fault_handler,
                *syntax_offset,
            ),
            BoundStatement::YieldReturn {
                expr,
                syntax_offset,
            } => self.visit_yield_return(expr, *syntax_offset),
            BoundStatement::YieldBreak | BoundStatement::Return(None) => {
                if self.factory.current_method_kind() == Some(MethodKind::Finally) {
                    return Err(LoweringError::ExitFromFinally);
                }
                Ok(self.generate_return(true))
            }
            BoundStatement::Return(Some(_)) => Err(LoweringError::ReturnWithValue),
        }
    }

    fn visit_list(
        &mut self,
        statements: &[BoundStatement],
    ) -> Result<Vec<BoundStatement>, LoweringError> {
        statements.iter().map(|s| self.visit(s)).collect()
    }

    fn visit_yield_return(
        &mut self,
        expr: &BoundExpr,
        syntax_offset: Option<u32>,
    ) -> Result<BoundStatement, LoweringError> {
        if self.factory.current_method_kind() == Some(MethodKind::Finally) {
            return Err(LoweringError::YieldInHandler { clause: "finally" });
        }

        let state = self.dispatcher.allocate_resumable(syntax_offset);
        let resume_label = self.factory.generate_label("resume");
        self.dispatcher.add_dispatch(state, resume_label);
        self.frames.add_state(self.current_frame, state);
        let finalize_state = self.frames.get(self.current_frame).finalize_state;
        trace!(state, frame = self.current_frame.0, "yield return");

        Ok(BoundStatement::block(vec![
            BoundStatement::assign_field(self.fields.current, expr.clone()),
            BoundStatement::assign_field(self.fields.state, BoundExpr::int(i64::from(state))),
            self.generate_return(false),
            BoundStatement::label(resume_label),
            BoundStatement::assign_field(
                self.fields.state,
                BoundExpr::int(i64::from(finalize_state)),
            ),
        ]))
    }

    fn visit_try(
        &mut self,
        try_block: &BoundStatement,
        catch_blocks: &[BoundCatchBlock],
        finally_block: Option<&BoundStatement>,
        prefer_fault_handler: bool,
        syntax_offset: Option<u32>,
    ) -> Result<BoundStatement, LoweringError> {
        let ordinal = self.next_try_ordinal;
        self.next_try_ordinal += 1;
        if ordinal >= self.analysis.try_count() {
            return Err(LoweringError::UnknownTryStatement { ordinal });
        }

        if !self.analysis.contains_yields(ordinal) {
            self.try_nesting_level += 1;
            let try_block = self.visit(try_block)?;
            let mut rewritten_catches = Vec::with_capacity(catch_blocks.len());
            for catch in catch_blocks {
                rewritten_catches.push(BoundCatchBlock {
                    local: catch.local,
                    body: self.visit(&catch.body)?,
                });
            }
            let finally_block = match finally_block {
                Some(finally_block) => Some(Box::new(self.visit(finally_block)?)),
                None => None,
            };
            self.try_nesting_level -= 1;
            return Ok(BoundStatement::Try {
                try_block: Box::new(try_block),
                catch_blocks: rewritten_catches,
                finally_block,
                prefer_fault_handler,
                syntax_offset,
            });
        }

        if !catch_blocks.is_empty() {
            return Err(LoweringError::YieldInTryWithCatch);
        }

        let frame = self.push_frame(ordinal, syntax_offset);
        let parent = self.frames.get(frame).parent.unwrap_or(FrameId::ROOT);
        let (finalize_state, handler) = {
            let f = self.frames.get(frame);
            (f.finalize_state, f.handler)
        };
        let Some(handler) = handler else {
            return Err(LoweringError::EmptyFinallyFrame { frame: frame.0 });
        };

        self.try_nesting_level += 1;
        let rewritten_body = self.visit(try_block)?;

        // the finally block becomes the body of the helper
        let outer_method = self.factory.set_current_method(Some(handler));
        let rewritten_finally = match finally_block {
            Some(finally_block) => self.visit(finally_block)?,
            None => BoundStatement::empty(),
        };
        self.factory.set_current_method(outer_method);
        self.try_nesting_level -= 1;
        self.current_frame = parent;

        let parent_finalize_state = self.frames.get(parent).finalize_state;
        self.factory.close_method(
            handler,
            BoundStatement::block(vec![
                BoundStatement::assign_field(
                    self.fields.state,
                    BoundExpr::int(i64::from(parent_finalize_state)),
                ),
                rewritten_finally,
                BoundStatement::ret(None),
            ]),
        );

        let mut statements = vec![
            BoundStatement::assign_field(
                self.fields.state,
                BoundExpr::int(i64::from(finalize_state)),
            ),
            rewritten_body,
            BoundStatement::expr(BoundExpr::call_this(handler)),
        ];

        let proxies: Vec<(LabelId, LabelId)> = self
            .frames
            .get(frame)
            .proxy_labels
            .iter()
            .map(|(destination, proxy)| (*destination, *proxy))
            .collect();
        if !proxies.is_empty() {
            let drop_through = self.factory.generate_label("dropThrough");
            statements.push(BoundStatement::goto(drop_through));
            for (destination, proxy) in proxies {
                statements.push(BoundStatement::label(proxy));
                statements.push(BoundStatement::expr(BoundExpr::call_this(handler)));
                let parent_proxy =
                    self.frames
                        .proxy_label_if_needed(parent, destination, self.factory);
                statements.push(BoundStatement::goto(parent_proxy));
            }
            statements.push(BoundStatement::label(drop_through));
        }

        debug!(
            frame = frame.0,
            finalize_state,
            proxies = self.frames.get(frame).proxy_labels.len(),
            "rewrote try with yield"
        );
        Ok(BoundStatement::block(statements))
    }

    fn push_frame(&mut self, ordinal: TryOrdinal, syntax_offset: Option<u32>) -> FrameId {
        let finalize_state = self.dispatcher.allocate_finalize(syntax_offset);
        let handler = self.factory.open_method(
            format!("<>m__Finally{}", self.finally_methods.len() + 1),
            MethodKind::Finally,
            "void",
            &[],
        );
        self.finally_methods.push(handler);
        self.finalize_states.push(finalize_state);

        let labels = self.analysis.labels(ordinal).cloned().unwrap_or_default();
        let frame = self
            .frames
            .push(self.current_frame, finalize_state, handler, labels);
        self.current_frame = frame;
        frame
    }

    /// `return !finished;`, or the exit-label equivalent inside a try.
    fn generate_return(&mut self, finished: bool) -> BoundStatement {
        let result = BoundExpr::bool(!finished);
        if self.try_nesting_level == 0 {
            return BoundStatement::ret(Some(result));
        }

        let exit_label = match self.exit_label {
            Some(label) => label,
            None => {
                let label = self.factory.generate_label("exitLabel");
                self.exit_label = Some(label);
                label
            }
        };
        let method_value = match self.method_value {
            Some(local) => local,
            None => {
                let local = self.factory.synthesized_local("methodValue");
                self.method_value = Some(local);
                local
            }
        };

        // finishing leaves every enclosing frame; suspending must not run
        // any finally block
        let target = if finished {
            self.frames
                .proxy_label_if_needed(self.current_frame, exit_label, self.factory)
        } else {
            exit_label
        };
        BoundStatement::block(vec![
            BoundStatement::assign(BoundExpr::local(method_value), result),
            BoundStatement::goto(target),
        ])
    }

    // =========================================================================
    // Dispose
    // =========================================================================

    fn dispose_body(&mut self) -> Result<BoundStatement, LoweringError> {
        if !self.frames.has_nested_frames() {
            return Ok(BoundStatement::block(vec![BoundStatement::ret(None)]));
        }

        let state = self.factory.synthesized_local("disposeState");
        let dispatch = self.emit_finally_frame(FrameId::ROOT, state)?;
        Ok(BoundStatement::block(vec![
            BoundStatement::assign(
                BoundExpr::local(state),
                BoundExpr::this_field(self.fields.state),
            ),
            dispatch,
            BoundStatement::assign_field(self.fields.state, BoundExpr::int(i64::from(FINISHED))),
            BoundStatement::ret(None),
        ]))
    }

    /// Nested switch running, innermost first, the finally handlers of every
    /// frame the current state is inside of.
    fn emit_finally_frame(
        &mut self,
        frame: FrameId,
        state: LocalId,
    ) -> Result<BoundStatement, LoweringError> {
        let mut body = None;

        let groups = self.frames.states_by_child(frame);
        if !groups.is_empty() {
            let break_label = self.factory.generate_label("break");
            let mut sections = Vec::with_capacity(groups.len());
            for (child, states) in groups {
                sections.push(BoundSwitchSection {
                    values: states.iter().map(|s| i64::from(*s)).collect(),
                    body: vec![
                        self.emit_finally_frame(child, state)?,
                        BoundStatement::goto(break_label),
                    ],
                });
            }
            body = Some(BoundStatement::block(vec![
                BoundStatement::Switch {
                    expression: BoundExpr::local(state),
                    sections,
                },
                BoundStatement::label(break_label),
            ]));
        }

        // each handler is protected separately, so a throwing inner finally
        // still lets the outer ones run
        if let Some(handler) = self.frames.get(frame).handler {
            let try_block = body.unwrap_or_else(BoundStatement::empty);
            body = Some(BoundStatement::try_finally(
                try_block,
                BoundStatement::block(vec![BoundStatement::expr(BoundExpr::call_this(handler))]),
            ));
        }

        body.ok_or(LoweringError::EmptyFinallyFrame { frame: frame.0 })
    }
}

#[cfg(test)]
#[path = "../tests/rewriter_tests.rs"]
mod tests;
