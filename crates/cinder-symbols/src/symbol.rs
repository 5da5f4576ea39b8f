//! Symbol handles and symbol data.
//!
//! Symbols live in a [`crate::SymbolTable`] arena and are referred to by
//! `SymbolId`. Types are symbols too: a constructed generic, an array or a
//! type parameter each get their own `SymbolId`, so type arguments and base
//! types are plain ids.

use rustc_hash::FxHashSet;

// =============================================================================
// Handles
// =============================================================================

/// Handle to a symbol in a `SymbolTable`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

impl SymbolId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to an assembly in a `SymbolTable`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssemblyId(pub u32);

impl AssemblyId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// =============================================================================
// Accessibility
// =============================================================================

/// Declared accessibility of a symbol.
///
/// | Variant | C# spelling |
/// |---------|-------------|
/// | `Private` | `private` |
/// | `ProtectedAndInternal` | `private protected` |
/// | `Protected` | `protected` |
/// | `Internal` | `internal` |
/// | `ProtectedOrInternal` | `protected internal` |
/// | `Public` | `public` |
///
/// `NotApplicable` is used by symbols that have no visibility of their own
/// (locals, namespaces, ...).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Accessibility {
    NotApplicable,
    Private,
    ProtectedAndInternal,
    Protected,
    Internal,
    ProtectedOrInternal,
    Public,
}

// =============================================================================
// Kinds
// =============================================================================

/// Kind of a named type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Enum,
    Delegate,
    /// The script class of an interactive submission. Later submissions treat
    /// earlier ones as enclosing classes.
    Submission,
}

/// Member kinds that go through the member accessibility check.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Method,
    Property,
    Field,
    Event,
}

/// Named-type payload.
#[derive(Clone, Debug)]
pub struct NamedTypeData {
    pub type_kind: TypeKind,
    /// `None` when this symbol is its own original definition; otherwise the
    /// generic definition this type was constructed from.
    pub original_definition: Option<SymbolId>,
    /// Type arguments of a constructed type. Empty for definitions.
    pub type_arguments: Vec<SymbolId>,
    pub base_type: Option<SymbolId>,
}

impl NamedTypeData {
    pub const fn is_definition(&self) -> bool {
        self.original_definition.is_none()
    }
}

/// What a symbol is.
#[derive(Clone, Debug)]
pub enum SymbolKind {
    Alias { target: SymbolId },
    ArrayType { element: SymbolId },
    PointerType { pointed_at: SymbolId },
    FunctionPointerType { signature: Vec<SymbolId> },
    NamedType(NamedTypeData),
    ErrorType,
    /// `effective_base` is the class constraint, used when a type parameter
    /// is the qualifier of a protected access.
    TypeParameter { effective_base: Option<SymbolId> },
    DynamicType,
    Parameter,
    Local,
    Label,
    Namespace,
    Assembly,
    NetModule,
    RangeVariable,
    Discard,
    Member(MemberKind),
}

impl SymbolKind {
    pub const fn is_type(&self) -> bool {
        matches!(
            self,
            Self::ArrayType { .. }
                | Self::PointerType { .. }
                | Self::FunctionPointerType { .. }
                | Self::NamedType(_)
                | Self::ErrorType
                | Self::TypeParameter { .. }
                | Self::DynamicType
        )
    }
}

// =============================================================================
// Symbol data
// =============================================================================

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub declared_accessibility: Accessibility,
    pub containing_type: Option<SymbolId>,
    pub containing_assembly: Option<AssemblyId>,
    pub is_static: bool,
}

impl Symbol {
    pub const fn named_type(&self) -> Option<&NamedTypeData> {
        match &self.kind {
            SymbolKind::NamedType(data) => Some(data),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AssemblyData {
    pub name: String,
    /// Script submissions. All interactive assemblies see each other's
    /// internals.
    pub is_interactive: bool,
    /// Assemblies this one grants internal access to (`InternalsVisibleTo`).
    pub internals_visible_to: FxHashSet<AssemblyId>,
}
