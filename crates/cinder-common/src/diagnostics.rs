//! Diagnostic types and message lookup.
//!
//! Diagnostics describe problems in user code. Internal-consistency failures
//! of the compiler itself are not diagnostics; those surface as typed errors
//! from the crate that detected them.

use serde::Serialize;

// =============================================================================
// Diagnostic Types
// =============================================================================

/// Diagnostic category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DiagnosticCategory {
    Warning = 0,
    Error = 1,
    Suggestion = 2,
    Message = 3,
}

/// A message template together with its code and category.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DiagnosticMessage {
    pub code: u32,
    pub category: DiagnosticCategory,
    pub message: &'static str,
}

/// A diagnostic about user code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub code: u32,
    pub message_text: String,
}

impl Diagnostic {
    /// Build an error diagnostic from a table entry and its arguments.
    pub fn from_message(message: &DiagnosticMessage, args: &[&str]) -> Self {
        Self {
            category: message.category,
            code: message.code,
            message_text: format_message(message.message, args),
        }
    }
}

// =============================================================================
// Message Table
// =============================================================================

pub mod diagnostic_codes {
    pub const INACCESSIBLE_DUE_TO_PROTECTION_LEVEL: u32 = 122;
    pub const BAD_PROTECTED_ACCESS: u32 = 1540;
}

pub mod diagnostic_messages {
    pub const INACCESSIBLE_DUE_TO_PROTECTION_LEVEL: &str =
        "'{0}' is inaccessible due to its protection level";
    pub const BAD_PROTECTED_ACCESS: &str = "Cannot access protected member '{0}' via a qualifier of type '{1}'; the qualifier must be of type '{2}' (or derived from it)";
}

pub static DIAGNOSTIC_MESSAGES: &[DiagnosticMessage] = &[
    DiagnosticMessage {
        code: diagnostic_codes::INACCESSIBLE_DUE_TO_PROTECTION_LEVEL,
        category: DiagnosticCategory::Error,
        message: diagnostic_messages::INACCESSIBLE_DUE_TO_PROTECTION_LEVEL,
    },
    DiagnosticMessage {
        code: diagnostic_codes::BAD_PROTECTED_ACCESS,
        category: DiagnosticCategory::Error,
        message: diagnostic_messages::BAD_PROTECTED_ACCESS,
    },
];

pub fn get_message(code: u32) -> Option<&'static DiagnosticMessage> {
    DIAGNOSTIC_MESSAGES.iter().find(|m| m.code == code)
}

pub fn format_message(message: &str, args: &[&str]) -> String {
    let mut result = message.to_string();
    for (i, arg) in args.iter().enumerate() {
        result = result.replace(&format!("{{{i}}}"), arg);
    }
    result
}

#[cfg(test)]
#[path = "../tests/diagnostics_tests.rs"]
mod tests;
