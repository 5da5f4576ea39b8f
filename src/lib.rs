//! cinder: iterator state-machine lowering and symbol accessibility checking
//! for a C#-like compiler.
//!
//! The work happens in the member crates; this crate re-exports them under
//! short names and hosts the `cinder` command-line driver.
//!
//! - [`bound`] - bound trees, the factory and the printer
//! - [`lowering`] - `lower_iterator` and the reference evaluator
//! - [`symbols`] - symbol table and `AccessibilityChecker`
//! - [`common`] - limits and diagnostics

pub use cinder_bound as bound;
pub use cinder_common as common;
pub use cinder_lowering as lowering;
pub use cinder_symbols as symbols;

pub use cinder_lowering::{
    IteratorStateMachine, LoweringError, LoweringOptions, lower_iterator, lower_iterators,
};
pub use cinder_symbols::{AccessCheck, AccessibilityChecker, SymbolTable, Within};

pub mod cli;

// Env-driven tracing setup for the binary
pub mod tracing_config;
