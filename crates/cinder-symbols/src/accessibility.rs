//! Symbol accessibility.
//!
//! Answers "may code located in `within` refer to `symbol`?", following the
//! full C# rules for `private`, `protected`, `internal` and their
//! combinations, including the protected "through type" rule: an instance
//! protected member inherited from `Base` may only be accessed from `Derived`
//! through an expression whose type is `Derived` (or derives from it).
//!
//! ## Hot path
//!
//! This check runs for every member lookup and is deliberately not memoized.
//! Nothing here allocates: the walks over containing types and base types use
//! scalar locals only.
//!
//! ## Result
//!
//! [`AccessCheck::failed_through_type_check`] distinguishes "inaccessible"
//! from "would be accessible, but the qualifier has the wrong type". It is
//! part of the return value, not an error; callers use it to pick between
//! CS0122 and CS1540.

use crate::symbol::{Accessibility, AssemblyId, SymbolId, SymbolKind};
use crate::table::SymbolTable;
use cinder_common::diagnostics::{Diagnostic, diagnostic_codes, get_message};
use cinder_common::limits::MAX_TYPE_CHAIN_WALK;
use tracing::trace;

/// The context an access happens from: inside a named type, or at assembly
/// level (e.g. an attribute argument).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Within {
    Type(SymbolId),
    Assembly(AssemblyId),
}

/// Outcome of an accessibility check.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessCheck {
    pub accessible: bool,
    /// Set when the only reason for failure is the protected through-type rule.
    pub failed_through_type_check: bool,
}

impl AccessCheck {
    pub const ACCESSIBLE: Self = Self {
        accessible: true,
        failed_through_type_check: false,
    };
}

/// Read-only accessibility predicate over a `SymbolTable`.
///
/// Holds nothing but a shared reference, so one checker may be used from many
/// threads at once.
#[derive(Copy, Clone)]
pub struct AccessibilityChecker<'a> {
    table: &'a SymbolTable,
}

impl<'a> AccessibilityChecker<'a> {
    pub const fn new(table: &'a SymbolTable) -> Self {
        Self { table }
    }

    /// Is `symbol` accessible from `within`, ignoring the through-type rule?
    pub fn is_symbol_accessible(&self, symbol: SymbolId, within: Within) -> bool {
        self.is_symbol_accessible_through(symbol, within, None)
            .accessible
    }

    /// Is `symbol` accessible from `within` when accessed through an
    /// expression of type `through_type`?
    pub fn is_symbol_accessible_through(
        &self,
        symbol: SymbolId,
        within: Within,
        through_type: Option<SymbolId>,
    ) -> AccessCheck {
        if let Within::Type(ty) = within {
            let is_named_type = self.table.is_named_type(ty);
            debug_assert!(is_named_type, "`within` must be a named type or an assembly");
            if !is_named_type {
                return AccessCheck::default();
            }
        }

        let mut failed_through_type_check = false;
        let accessible =
            self.is_symbol_accessible_core(symbol, within, through_type, &mut failed_through_type_check);
        trace!(
            symbol = symbol.0,
            ?within,
            accessible,
            failed_through_type_check,
            "is_symbol_accessible"
        );
        AccessCheck {
            accessible,
            failed_through_type_check: !accessible && failed_through_type_check,
        }
    }

    /// Produce the diagnostic for an inaccessible symbol, or `None` when the
    /// access is allowed.
    pub fn check_accessibility(
        &self,
        symbol: SymbolId,
        within: Within,
        through_type: Option<SymbolId>,
    ) -> Option<Diagnostic> {
        let result = self.is_symbol_accessible_through(symbol, within, through_type);
        if result.accessible {
            return None;
        }

        let symbol_name = self.table.display_name(symbol);
        if result.failed_through_type_check
            && let Some(through) = through_type
            && let Within::Type(within_type) = within
            && let Some(message) = get_message(diagnostic_codes::BAD_PROTECTED_ACCESS)
        {
            let through_name = self.table.display_name(through);
            let within_name = self.table.display_name(within_type);
            return Some(Diagnostic::from_message(
                message,
                &[&symbol_name, &through_name, &within_name],
            ));
        }

        let message = get_message(diagnostic_codes::INACCESSIBLE_DUE_TO_PROTECTION_LEVEL)?;
        Some(Diagnostic::from_message(message, &[&symbol_name]))
    }

    // =========================================================================
    // Core
    // =========================================================================

    fn is_symbol_accessible_core(
        &self,
        symbol: SymbolId,
        within: Within,
        through_type: Option<SymbolId>,
        failed_through_type_check: &mut bool,
    ) -> bool {
        let data = self.table.symbol(symbol);
        match &data.kind {
            SymbolKind::Alias { target } => self.is_symbol_accessible_core(
                *target,
                within,
                through_type,
                failed_through_type_check,
            ),
            SymbolKind::ArrayType { element } => {
                self.is_symbol_accessible_core(*element, within, None, failed_through_type_check)
            }
            SymbolKind::PointerType { pointed_at } => self.is_symbol_accessible_core(
                *pointed_at,
                within,
                None,
                failed_through_type_check,
            ),
            SymbolKind::FunctionPointerType { signature } => signature.iter().all(|&ty| {
                self.is_symbol_accessible_core(ty, within, None, failed_through_type_check)
            }),
            SymbolKind::NamedType(_) => self.is_named_type_accessible(symbol, within),
            SymbolKind::ErrorType
            | SymbolKind::TypeParameter { .. }
            | SymbolKind::DynamicType
            | SymbolKind::Parameter
            | SymbolKind::Local
            | SymbolKind::Label
            | SymbolKind::Namespace
            | SymbolKind::Assembly
            | SymbolKind::NetModule
            | SymbolKind::RangeVariable
            | SymbolKind::Discard => true,
            SymbolKind::Member(_) => {
                // protected-through-type only constrains instance access
                let through_type = if data.is_static { None } else { through_type };
                debug_assert!(
                    data.containing_type.is_some(),
                    "member without a containing type"
                );
                let Some(containing_type) = data.containing_type else {
                    return false;
                };
                self.is_member_accessible(
                    containing_type,
                    data.declared_accessibility,
                    within,
                    through_type,
                    failed_through_type_check,
                )
            }
        }
    }

    fn is_named_type_accessible(&self, ty: SymbolId, within: Within) -> bool {
        let data = self.table.symbol(ty);
        let Some(named) = data.named_type() else {
            return true;
        };

        if !named.is_definition() {
            for &argument in &named.type_arguments {
                // type parameters are always accessible, and error types have
                // already been reported
                if matches!(
                    self.table.symbol(argument).kind,
                    SymbolKind::TypeParameter { .. } | SymbolKind::ErrorType
                ) {
                    continue;
                }
                let mut unused = false;
                if !self.is_symbol_accessible_core(argument, within, None, &mut unused) {
                    return false;
                }
            }
        }

        match data.containing_type {
            None => match data.containing_assembly {
                Some(assembly) => self.is_non_nested_type_accessible(
                    assembly,
                    data.declared_accessibility,
                    within,
                ),
                None => true,
            },
            Some(containing_type) => {
                let mut unused = false;
                self.is_member_accessible(
                    containing_type,
                    data.declared_accessibility,
                    within,
                    None,
                    &mut unused,
                )
            }
        }
    }

    fn is_non_nested_type_accessible(
        &self,
        declaring_assembly: AssemblyId,
        declared_accessibility: Accessibility,
        within: Within,
    ) -> bool {
        match declared_accessibility {
            Accessibility::NotApplicable | Accessibility::Public => true,
            // not legal on top-level types
            Accessibility::Private
            | Accessibility::Protected
            | Accessibility::ProtectedAndInternal => false,
            Accessibility::Internal | Accessibility::ProtectedOrInternal => self
                .within_assembly(within)
                .is_some_and(|from| self.table.has_internal_access(from, declaring_assembly)),
        }
    }

    fn is_member_accessible(
        &self,
        containing_type: SymbolId,
        declared_accessibility: Accessibility,
        within: Within,
        through_type: Option<SymbolId>,
        failed_through_type_check: &mut bool,
    ) -> bool {
        *failed_through_type_check = false;

        // a member of an inaccessible type is inaccessible
        if !self.is_named_type_accessible(containing_type, within) {
            return false;
        }

        let original_containing_type = self.table.original_definition(containing_type);
        let within_type = match within {
            Within::Type(ty) => Some(ty),
            Within::Assembly(_) => None,
        };

        match declared_accessibility {
            Accessibility::NotApplicable | Accessibility::Public => true,
            Accessibility::Private => {
                // earlier submissions act as enclosing classes of later ones
                if self.table.is_submission_class(original_containing_type) {
                    return true;
                }
                within_type.is_some_and(|ty| {
                    self.is_nested_within_original_containing_type(ty, original_containing_type)
                })
            }
            Accessibility::Internal => self.has_internal_access_to(within, containing_type),
            Accessibility::ProtectedAndInternal => {
                if !self.has_internal_access_to(within, containing_type) {
                    return false;
                }
                self.is_protected_accessible(
                    within_type,
                    through_type,
                    original_containing_type,
                    failed_through_type_check,
                )
            }
            Accessibility::ProtectedOrInternal => {
                if self.has_internal_access_to(within, containing_type) {
                    return true;
                }
                self.is_protected_accessible(
                    within_type,
                    through_type,
                    original_containing_type,
                    failed_through_type_check,
                )
            }
            Accessibility::Protected => self.is_protected_accessible(
                within_type,
                through_type,
                original_containing_type,
                failed_through_type_check,
            ),
        }
    }

    fn is_protected_accessible(
        &self,
        within_type: Option<SymbolId>,
        through_type: Option<SymbolId>,
        original_containing_type: SymbolId,
        failed_through_type_check: &mut bool,
    ) -> bool {
        *failed_through_type_check = false;

        // protected members of a script class behave like private members
        // visible to later submissions
        if self.table.is_submission_class(original_containing_type) {
            return true;
        }

        let Some(within_type) = within_type else {
            return false;
        };

        if self.is_nested_within_original_containing_type(within_type, original_containing_type) {
            return true;
        }

        let original_through_type = through_type.map(|ty| self.table.original_definition(ty));

        // Walk the enclosing types of the access site. The first one deriving
        // from the member's type decides the outcome.
        let mut current = Some(self.table.original_definition(within_type));
        let mut steps = 0;
        while let Some(enclosing) = current {
            if self
                .table
                .inherits_from_or_equals_ignoring_construction(enclosing, original_containing_type)
            {
                return match original_through_type {
                    None => true,
                    Some(through) => {
                        let ok = self
                            .table
                            .inherits_from_or_equals_ignoring_construction(through, enclosing);
                        *failed_through_type_check = !ok;
                        ok
                    }
                };
            }
            steps += 1;
            if steps > MAX_TYPE_CHAIN_WALK {
                break;
            }
            current = self
                .table
                .containing_type(enclosing)
                .map(|ty| self.table.original_definition(ty));
        }
        false
    }

    /// Is `within_type` (reflexively) nested inside `original_containing_type`?
    fn is_nested_within_original_containing_type(
        &self,
        within_type: SymbolId,
        original_containing_type: SymbolId,
    ) -> bool {
        let mut current = Some(self.table.original_definition(within_type));
        let mut steps = 0;
        while let Some(ty) = current {
            if ty == original_containing_type {
                return true;
            }
            steps += 1;
            if steps > MAX_TYPE_CHAIN_WALK {
                return false;
            }
            current = self
                .table
                .containing_type(ty)
                .map(|outer| self.table.original_definition(outer));
        }
        false
    }

    fn within_assembly(&self, within: Within) -> Option<AssemblyId> {
        match within {
            Within::Assembly(assembly) => Some(assembly),
            Within::Type(ty) => self.table.containing_assembly(ty),
        }
    }

    fn has_internal_access_to(&self, within: Within, containing_type: SymbolId) -> bool {
        match (
            self.within_assembly(within),
            self.table.containing_assembly(containing_type),
        ) {
            (Some(from), Some(to)) => self.table.has_internal_access(from, to),
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "../tests/accessibility_tests.rs"]
mod tests;
