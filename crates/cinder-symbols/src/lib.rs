//! Symbols and accessibility for the cinder compiler.
//!
//! - `symbol` - `SymbolId`/`AssemblyId` handles, `SymbolKind`, `Accessibility`
//! - `table` - `SymbolTable`, the read-only symbol graph plus its builder API
//! - `accessibility` - `AccessibilityChecker`, the access predicate used by
//!   every member lookup during semantic analysis

pub mod accessibility;
pub mod symbol;
pub mod table;

pub use accessibility::{AccessCheck, AccessibilityChecker, Within};
pub use symbol::{
    Accessibility, AssemblyData, AssemblyId, MemberKind, NamedTypeData, Symbol, SymbolId,
    SymbolKind, TypeKind,
};
pub use table::{Container, SymbolTable};
