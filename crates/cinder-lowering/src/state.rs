//! State numbers.
//!
//! The `state` field of a generated iterator is an `i32`:
//!
//! | Value | Meaning |
//! |-------|---------|
//! | `0` | initial: the next `MoveNext` starts the body |
//! | `1, 2, ...` | suspended at a `yield return` |
//! | `-1` | running, or outside every try-with-yield |
//! | `-2` | finished (also: enumerable not yet enumerated) |
//! | `-3, -4, ...` | running inside a specific try-with-yield |

pub type StateNumber = i32;

pub const INITIAL: StateNumber = 0;
pub const FIRST_RESUMABLE: StateNumber = 1;
pub const NOT_STARTED_OR_RUNNING: StateNumber = -1;
pub const FINISHED: StateNumber = -2;
/// State an enumerable is constructed in by the kick-off method; the first
/// `GetEnumerator` moves it to `INITIAL`.
pub const INITIAL_ENUMERABLE: StateNumber = FINISHED;
pub const FIRST_FINALIZE: StateNumber = -3;

pub const fn is_resumable(state: StateNumber) -> bool {
    state >= FIRST_RESUMABLE
}

pub const fn is_finalize(state: StateNumber) -> bool {
    state <= FIRST_FINALIZE
}
