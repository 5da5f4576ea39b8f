//! The symbol graph.
//!
//! `SymbolTable` is built once (through the `add_*` methods) and then only
//! read. Every query here is allocation-free so the accessibility checker can
//! call them on its hot path; `display_name` is the one exception and is only
//! used when reporting a diagnostic.

use crate::symbol::{
    Accessibility, AssemblyData, AssemblyId, MemberKind, NamedTypeData, Symbol, SymbolId,
    SymbolKind, TypeKind,
};
use cinder_common::limits::MAX_TYPE_CHAIN_WALK;
use rustc_hash::FxHashSet;

/// Where a type is declared.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Container {
    /// Top-level type in an assembly.
    Assembly(AssemblyId),
    /// Nested type.
    Type(SymbolId),
}

#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    assemblies: Vec<AssemblyData>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Building
    // =========================================================================

    pub fn add_assembly(&mut self, name: impl Into<String>) -> AssemblyId {
        self.push_assembly(name.into(), false)
    }

    /// Add a script submission assembly.
    pub fn add_interactive_assembly(&mut self, name: impl Into<String>) -> AssemblyId {
        self.push_assembly(name.into(), true)
    }

    fn push_assembly(&mut self, name: String, is_interactive: bool) -> AssemblyId {
        let id = AssemblyId(self.assemblies.len() as u32);
        self.assemblies.push(AssemblyData {
            name,
            is_interactive,
            internals_visible_to: FxHashSet::default(),
        });
        id
    }

    /// `[assembly: InternalsVisibleTo("friend")]` on `declaring`.
    pub fn grant_internals_visible_to(&mut self, declaring: AssemblyId, friend: AssemblyId) {
        self.assemblies[declaring.index()]
            .internals_visible_to
            .insert(friend);
    }

    pub fn add_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    /// Add a type definition, top-level or nested.
    pub fn add_type(
        &mut self,
        name: impl Into<String>,
        type_kind: TypeKind,
        accessibility: Accessibility,
        container: Container,
    ) -> SymbolId {
        let (containing_type, containing_assembly) = self.resolve_container(container);
        self.add_symbol(Symbol {
            name: name.into(),
            kind: SymbolKind::NamedType(NamedTypeData {
                type_kind,
                original_definition: None,
                type_arguments: Vec::new(),
                base_type: None,
            }),
            declared_accessibility: accessibility,
            containing_type,
            containing_assembly,
            is_static: false,
        })
    }

    /// Shorthand for a class definition.
    pub fn add_class(
        &mut self,
        name: impl Into<String>,
        accessibility: Accessibility,
        container: Container,
    ) -> SymbolId {
        self.add_type(name, TypeKind::Class, accessibility, container)
    }

    pub fn set_base_type(&mut self, ty: SymbolId, base: SymbolId) {
        if let SymbolKind::NamedType(data) = &mut self.symbols[ty.index()].kind {
            data.base_type = Some(base);
        }
    }

    /// Construct `definition<type_arguments>`.
    ///
    /// The constructed type inherits the definition's accessibility, container
    /// and base type.
    pub fn construct(&mut self, definition: SymbolId, type_arguments: Vec<SymbolId>) -> SymbolId {
        let def = &self.symbols[definition.index()];
        let (type_kind, base_type) = match &def.kind {
            SymbolKind::NamedType(data) => (data.type_kind, data.base_type),
            _ => (TypeKind::Class, None),
        };
        let symbol = Symbol {
            name: def.name.clone(),
            kind: SymbolKind::NamedType(NamedTypeData {
                type_kind,
                original_definition: Some(definition),
                type_arguments,
                base_type,
            }),
            declared_accessibility: def.declared_accessibility,
            containing_type: def.containing_type,
            containing_assembly: def.containing_assembly,
            is_static: false,
        };
        self.add_symbol(symbol)
    }

    pub fn add_member(
        &mut self,
        name: impl Into<String>,
        kind: MemberKind,
        accessibility: Accessibility,
        containing_type: SymbolId,
        is_static: bool,
    ) -> SymbolId {
        let containing_assembly = self.symbols[containing_type.index()].containing_assembly;
        self.add_symbol(Symbol {
            name: name.into(),
            kind: SymbolKind::Member(kind),
            declared_accessibility: accessibility,
            containing_type: Some(containing_type),
            containing_assembly,
            is_static,
        })
    }

    pub fn add_array(&mut self, element: SymbolId) -> SymbolId {
        let name = format!("{}[]", self.symbols[element.index()].name);
        self.add_unowned(name, SymbolKind::ArrayType { element })
    }

    pub fn add_pointer(&mut self, pointed_at: SymbolId) -> SymbolId {
        let name = format!("{}*", self.symbols[pointed_at.index()].name);
        self.add_unowned(name, SymbolKind::PointerType { pointed_at })
    }

    pub fn add_function_pointer(&mut self, signature: Vec<SymbolId>) -> SymbolId {
        self.add_unowned(
            "delegate*".to_string(),
            SymbolKind::FunctionPointerType { signature },
        )
    }

    pub fn add_alias(&mut self, name: impl Into<String>, target: SymbolId) -> SymbolId {
        self.add_unowned(name.into(), SymbolKind::Alias { target })
    }

    pub fn add_type_parameter(
        &mut self,
        name: impl Into<String>,
        effective_base: Option<SymbolId>,
    ) -> SymbolId {
        self.add_unowned(name.into(), SymbolKind::TypeParameter { effective_base })
    }

    pub fn add_error_type(&mut self, name: impl Into<String>) -> SymbolId {
        self.add_unowned(name.into(), SymbolKind::ErrorType)
    }

    /// Add a symbol that carries no accessibility of its own (locals,
    /// namespaces, constructed array/pointer types, ...).
    pub fn add_unowned(&mut self, name: String, kind: SymbolKind) -> SymbolId {
        self.add_symbol(Symbol {
            name,
            kind,
            declared_accessibility: Accessibility::NotApplicable,
            containing_type: None,
            containing_assembly: None,
            is_static: false,
        })
    }

    fn resolve_container(&self, container: Container) -> (Option<SymbolId>, Option<AssemblyId>) {
        match container {
            Container::Assembly(assembly) => (None, Some(assembly)),
            Container::Type(ty) => (Some(ty), self.symbols[ty.index()].containing_assembly),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Look up a symbol. Ids are only ever minted by this table, so an
    /// out-of-range id is a caller bug.
    #[inline]
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.index())
    }

    #[inline]
    pub fn assembly(&self, id: AssemblyId) -> &AssemblyData {
        &self.assemblies[id.index()]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    #[inline]
    pub fn containing_type(&self, id: SymbolId) -> Option<SymbolId> {
        self.symbol(id).containing_type
    }

    #[inline]
    pub fn containing_assembly(&self, id: SymbolId) -> Option<AssemblyId> {
        self.symbol(id).containing_assembly
    }

    /// The generic definition of a constructed type; any other symbol is its
    /// own original definition.
    #[inline]
    pub fn original_definition(&self, id: SymbolId) -> SymbolId {
        match &self.symbol(id).kind {
            SymbolKind::NamedType(NamedTypeData {
                original_definition: Some(def),
                ..
            }) => *def,
            _ => id,
        }
    }

    pub fn is_named_type(&self, id: SymbolId) -> bool {
        matches!(self.symbol(id).kind, SymbolKind::NamedType(_))
    }

    pub fn is_submission_class(&self, id: SymbolId) -> bool {
        matches!(
            &self.symbol(id).kind,
            SymbolKind::NamedType(NamedTypeData {
                type_kind: TypeKind::Submission,
                ..
            })
        )
    }

    /// Direct base of a type. A type parameter's base is its effective base
    /// class.
    pub fn base_type(&self, id: SymbolId) -> Option<SymbolId> {
        match &self.symbol(id).kind {
            SymbolKind::NamedType(data) => data.base_type,
            SymbolKind::TypeParameter { effective_base } => *effective_base,
            _ => None,
        }
    }

    /// Does `ty` equal `base` or derive from it, comparing original
    /// definitions (`Derived<int>` inherits from `Base<T>`)?
    pub fn inherits_from_or_equals_ignoring_construction(
        &self,
        ty: SymbolId,
        base: SymbolId,
    ) -> bool {
        let base = self.original_definition(base);
        let mut current = Some(self.original_definition(ty));
        let mut steps = 0;
        while let Some(candidate) = current {
            if candidate == base {
                return true;
            }
            steps += 1;
            if steps > MAX_TYPE_CHAIN_WALK {
                return false;
            }
            current = self
                .base_type(candidate)
                .map(|next| self.original_definition(next));
        }
        false
    }

    /// Can code in `from` see `internal` symbols of `to`?
    pub fn has_internal_access(&self, from: AssemblyId, to: AssemblyId) -> bool {
        if from == to {
            return true;
        }
        let declaring = self.assembly(to);
        if declaring.internals_visible_to.contains(&from) {
            return true;
        }
        // all script submissions are friends of each other
        declaring.is_interactive && self.assembly(from).is_interactive
    }

    /// Dotted name through containing types, e.g. `Outer.Inner.M`.
    pub fn display_name(&self, id: SymbolId) -> String {
        let symbol = self.symbol(id);
        match symbol.containing_type {
            Some(container) => format!("{}.{}", self.display_name(container), symbol.name),
            None => symbol.name.clone(),
        }
    }
}

#[cfg(test)]
#[path = "../tests/table_tests.rs"]
mod tests;
