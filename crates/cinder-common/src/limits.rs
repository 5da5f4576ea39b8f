//! Centralized limits and thresholds for the cinder compiler.
//!
//! This module provides shared constants for recursion depths and operation
//! counts used throughout the codebase. Centralizing these values keeps the
//! rewriter, the symbol walks and the reference evaluator from each inventing
//! their own bounds.
//!
//! # Categories
//!
//! - **Recursion Depths**: Limits to prevent stack overflow in recursive tree rewrites
//! - **Walk Lengths**: Limits on parent-pointer walks over symbol graphs
//! - **Operation Counts**: Limits to stop runaway evaluation of lowered code

// =============================================================================
// Recursion Depth Limits
// =============================================================================

/// Maximum statement nesting depth the iterator rewriter will descend into.
///
/// Every nested block, try statement and switch section adds a frame to the
/// rewriter's call stack. Bodies deeper than this abort lowering for the
/// method with an internal error instead of overflowing the stack.
///
/// # Example
///
/// ```text
/// { { { { ... 1000 levels ... yield return 1; ... } } } }
/// ```
pub const MAX_REWRITE_DEPTH: u32 = 1000;

/// Maximum depth for the bound printer before it prints `...` instead of recursing.
pub const MAX_PRINT_DEPTH: u32 = 1000;

// =============================================================================
// Walk Lengths
// =============================================================================

/// Maximum number of links followed when walking `ContainingType` or base
/// type chains.
///
/// Symbol graphs handed to the accessibility checker are expected to be
/// acyclic. A malformed graph (a type listed as its own base) would otherwise
/// spin forever inside a hot path that is called for every member lookup.
pub const MAX_TYPE_CHAIN_WALK: u32 = 4096;

// =============================================================================
// Operation Counts
// =============================================================================

/// Maximum number of statements the reference evaluator executes per
/// top-level call (`MoveNext`, `Dispose`, ...).
///
/// Lowered code containing an unconditional backwards `goto` with no yield
/// would loop forever; the evaluator reports `StepLimitExceeded` instead.
pub const MAX_EVAL_STEPS: u64 = 1_000_000;

/// Maximum call depth of synthesized methods inside the reference evaluator
/// (`MoveNext` -> `Dispose` -> `Finally3` -> ...).
pub const MAX_EVAL_CALL_DEPTH: u32 = 256;
