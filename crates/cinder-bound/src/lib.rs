//! Bound trees for the cinder compiler.
//!
//! - `ids` - `LabelId`, `LocalId`, `FieldId`, `MethodId` handles
//! - `tree` - `BoundStatement`/`BoundExpr` and builder helpers
//! - `method` - `IteratorMethod`, the input unit of iterator lowering
//! - `factory` - `BoundFactory`: fresh labels, locals, fields and methods
//! - `printer` - `BoundPrinter`: C#-like pseudo-code output

pub mod factory;
pub mod ids;
pub mod method;
pub mod printer;
pub mod tree;

pub use factory::{BoundFactory, BoundTables, FieldDef, MethodKind, SynthesizedMethod};
pub use ids::{FieldId, LabelId, LocalId, MethodId};
pub use method::{IteratorKind, IteratorMethod};
pub use printer::BoundPrinter;
pub use tree::{
    BinaryOp, BoundCatchBlock, BoundExpr, BoundStatement, BoundSwitchSection, Callee, Literal,
};
