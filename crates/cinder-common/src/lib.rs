//! Common types and utilities for the cinder compiler.
//!
//! This crate provides foundational pieces shared by all cinder crates:
//! - Compiler limits and thresholds
//! - Diagnostic types and the message table

// Centralized limits and thresholds
pub mod limits;

// Diagnostics reported to callers (never thrown)
pub mod diagnostics;
pub use diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticMessage};
