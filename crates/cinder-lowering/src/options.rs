//! Lowering configuration.

use crate::state::StateNumber;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoweringOptions {
    /// Emit the `initialThreadId` field and check it in `GetEnumerator`, so
    /// only the creating thread reuses the enumerable as its own enumerator.
    #[serde(default = "default_track_initial_thread")]
    pub track_initial_thread: bool,

    /// State numbers from a previous compilation of the same method, keyed
    /// by the syntax offset of the `yield return` (resumable states) or the
    /// `try` statement (finalize states).
    #[serde(default)]
    pub previous_states: FxHashMap<u32, StateNumber>,
}

const fn default_track_initial_thread() -> bool {
    true
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self {
            track_initial_thread: true,
            previous_states: FxHashMap::default(),
        }
    }
}

impl LoweringOptions {
    pub fn with_previous_states(
        mut self,
        states: impl IntoIterator<Item = (u32, StateNumber)>,
    ) -> Self {
        self.previous_states = states.into_iter().collect();
        self
    }
}
