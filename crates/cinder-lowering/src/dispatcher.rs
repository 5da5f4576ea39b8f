//! State allocation and the `MoveNext` resume dispatch.
//!
//! Resumable states count up from `FIRST_RESUMABLE`, finalize states count
//! down from `FIRST_FINALIZE`. When a previous compilation's state map is
//! supplied, a suspension point or try statement whose syntax offset appears
//! in it keeps its old number, and fresh numbers continue past the highest
//! (resp. lowest) number the previous compilation used. That keeps states of
//! unchanged code stable across edits.

use crate::state::{
    FIRST_FINALIZE, FIRST_RESUMABLE, StateNumber, is_finalize, is_resumable,
};
use cinder_bound::{BoundExpr, BoundStatement, BoundSwitchSection, LabelId};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::trace;

/// One entry of the state map emitted alongside a lowered method.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMapEntry {
    pub syntax_offset: u32,
    pub state: StateNumber,
}

#[derive(Clone, Debug)]
pub struct StateDispatcher {
    previous: FxHashMap<u32, StateNumber>,
    next_resumable: StateNumber,
    next_finalize: StateNumber,
    used: FxHashSet<StateNumber>,
    dispatches: IndexMap<LabelId, SmallVec<[StateNumber; 1]>>,
    state_map: Vec<StateMapEntry>,
}

impl StateDispatcher {
    pub fn new(previous: &FxHashMap<u32, StateNumber>) -> Self {
        let next_resumable = previous
            .values()
            .copied()
            .filter(|&s| is_resumable(s))
            .max()
            .map_or(FIRST_RESUMABLE, |s| s + 1);
        let next_finalize = previous
            .values()
            .copied()
            .filter(|&s| is_finalize(s))
            .min()
            .map_or(FIRST_FINALIZE, |s| s - 1);
        Self {
            previous: previous.clone(),
            next_resumable,
            next_finalize,
            used: FxHashSet::default(),
            dispatches: IndexMap::new(),
            state_map: Vec::new(),
        }
    }

    /// State for a `yield return`.
    pub fn allocate_resumable(&mut self, syntax_offset: Option<u32>) -> StateNumber {
        let state = match self.reuse(syntax_offset, is_resumable) {
            Some(state) => state,
            None => {
                while self.used.contains(&self.next_resumable) {
                    self.next_resumable += 1;
                }
                let state = self.next_resumable;
                self.next_resumable += 1;
                state
            }
        };
        self.record(syntax_offset, state);
        state
    }

    /// Finalize state for a try-with-yield.
    pub fn allocate_finalize(&mut self, syntax_offset: Option<u32>) -> StateNumber {
        let state = match self.reuse(syntax_offset, is_finalize) {
            Some(state) => state,
            None => {
                while self.used.contains(&self.next_finalize) {
                    self.next_finalize -= 1;
                }
                let state = self.next_finalize;
                self.next_finalize -= 1;
                state
            }
        };
        self.record(syntax_offset, state);
        state
    }

    fn reuse(
        &self,
        syntax_offset: Option<u32>,
        kind: fn(StateNumber) -> bool,
    ) -> Option<StateNumber> {
        let previous = *self.previous.get(&syntax_offset?)?;
        (kind(previous) && !self.used.contains(&previous)).then_some(previous)
    }

    fn record(&mut self, syntax_offset: Option<u32>, state: StateNumber) {
        self.used.insert(state);
        if let Some(syntax_offset) = syntax_offset {
            self.state_map.push(StateMapEntry {
                syntax_offset,
                state,
            });
        }
        trace!(state, ?syntax_offset, "allocate state");
    }

    /// `case state: goto label;` in the resume dispatch.
    pub fn add_dispatch(&mut self, state: StateNumber, label: LabelId) {
        self.dispatches.entry(label).or_default().push(state);
    }

    /// Resumable states and their labels, in allocation order.
    pub fn dispatches(&self) -> impl Iterator<Item = (StateNumber, LabelId)> + '_ {
        self.dispatches
            .iter()
            .flat_map(|(label, states)| states.iter().map(move |s| (*s, *label)))
    }

    /// `switch (state) { case n: goto resume_n; ... }`
    pub fn dispatch(&self, state: BoundExpr) -> BoundStatement {
        let sections = self
            .dispatches
            .iter()
            .map(|(label, states)| BoundSwitchSection {
                values: states.iter().map(|s| i64::from(*s)).collect(),
                body: vec![BoundStatement::goto(*label)],
            })
            .collect();
        BoundStatement::Switch {
            expression: state,
            sections,
        }
    }

    pub fn state_map(&self) -> &[StateMapEntry] {
        &self.state_map
    }

    pub fn into_state_map(self) -> Vec<StateMapEntry> {
        self.state_map
    }
}

#[cfg(test)]
#[path = "../tests/dispatcher_tests.rs"]
mod tests;
