//! Iterator lowering for the cinder compiler.
//!
//! Rewrites a method containing `yield return`/`yield break` into a state
//! machine class: a `MoveNext` that resumes at the right suspension point,
//! a `Dispose` that runs exactly the pending finally blocks, and the glue
//! members of the enumerator protocol.
//!
//! Pipeline, per method:
//! 1. `yields_in_try` - find try statements containing yields, check
//!    preconditions
//! 2. `rewriter` - rewrite the body, building the `finally_frame` tree and
//!    allocating states through the `dispatcher`
//! 3. `shape` - assemble fields, constructor and protocol members
//!
//! `runner` executes the result; it exists for tests and the CLI.

pub mod dispatcher;
pub mod error;
pub mod finally_frame;
pub mod options;
pub mod rewriter;
pub mod runner;
pub mod shape;
pub mod state;
pub mod yields_in_try;

pub use dispatcher::{StateDispatcher, StateMapEntry};
pub use error::{LoweringError, RunError};
pub use finally_frame::{FinallyFrame, FinallyFrameTree, FrameId};
pub use options::LoweringOptions;
pub use rewriter::{IteratorBodyRewriter, RewrittenIterator, StateFields};
pub use runner::{StateMachineRunner, Value};
pub use shape::{IteratorStateMachine, MachineMembers, StateMachineShapeBuilder};
pub use state::StateNumber;
pub use yields_in_try::{TryOrdinal, YieldsInTryAnalysis};

use cinder_bound::IteratorMethod;
use rayon::prelude::*;

/// Lower one iterator method.
#[tracing::instrument(level = "debug", skip_all, fields(method = %method.name))]
pub fn lower_iterator(
    method: &IteratorMethod,
    options: &LoweringOptions,
) -> Result<IteratorStateMachine, LoweringError> {
    lower_iterator_with_ordinal(method, 0, options)
}

/// Lower one iterator method; `ordinal` becomes part of the machine name.
pub fn lower_iterator_with_ordinal(
    method: &IteratorMethod,
    ordinal: u32,
    options: &LoweringOptions,
) -> Result<IteratorStateMachine, LoweringError> {
    let machine = StateMachineShapeBuilder::new(method, options, ordinal).build()?;
    tracing::debug!(
        machine = %machine.name,
        resumable = machine.resumable_states.len(),
        finally_methods = machine.finally_methods.len(),
        "lowered iterator"
    );
    Ok(machine)
}

/// Lower independent methods in parallel. Results are in input order, and
/// the i-th machine gets ordinal `i`.
pub fn lower_iterators(
    methods: &[IteratorMethod],
    options: &LoweringOptions,
) -> Vec<Result<IteratorStateMachine, LoweringError>> {
    methods
        .par_iter()
        .enumerate()
        .map(|(ordinal, method)| lower_iterator_with_ordinal(method, ordinal as u32, options))
        .collect()
}

/// Like [`lower_iterators`], with options chosen per method (for example
/// previous state numbers looked up by method name).
pub fn lower_iterators_with<F>(
    methods: &[IteratorMethod],
    options_for: F,
) -> Vec<Result<IteratorStateMachine, LoweringError>>
where
    F: Fn(&IteratorMethod) -> LoweringOptions + Sync,
{
    methods
        .par_iter()
        .enumerate()
        .map(|(ordinal, method)| {
            lower_iterator_with_ordinal(method, ordinal as u32, &options_for(method))
        })
        .collect()
}

#[cfg(test)]
#[path = "../tests/lowering_tests.rs"]
mod tests;
